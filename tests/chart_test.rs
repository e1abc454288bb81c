mod common;

use common::{SCORES_CSV, is_png};
use report_dashboard::graph::{ChartOptions, ChartSpec, render};
use report_dashboard::table::TabularModel;

fn model(raw: &[u8]) -> TabularModel {
    TabularModel::ingest(raw).expect("parse")
}

#[test]
fn renders_png_for_numeric_data() {
    let png = render(&model(SCORES_CSV), &ChartOptions::default())
        .expect("render")
        .expect("chart present");

    assert!(is_png(&png));
    let decoded = image::load_from_memory(&png).expect("decode");
    assert_eq!((decoded.width(), decoded.height()), (640, 480));
    println!("✓ bar chart PNG");
}

#[test]
fn canvas_size_follows_options() {
    let options = ChartOptions {
        width: 320,
        height: 200,
    };
    let png = render(&model(SCORES_CSV), &options)
        .expect("render")
        .expect("chart present");

    let decoded = image::load_from_memory(&png).expect("decode");
    assert_eq!((decoded.width(), decoded.height()), (320, 200));
    println!("✓ custom canvas size");
}

#[test]
fn no_numeric_column_means_no_chart() {
    let result = render(&model(b"city,country\nOslo,Norway\n"), &ChartOptions::default())
        .expect("render");
    assert!(result.is_none());
    println!("✓ no chart without numeric data");
}

#[test]
fn axis_selection() {
    assert_eq!(
        ChartSpec::select(&model(SCORES_CSV)),
        Some(ChartSpec {
            category: 0,
            value: 1
        })
    );
    // Numeric first, text later
    assert_eq!(
        ChartSpec::select(&model(b"score,name\n1,a\n")),
        Some(ChartSpec {
            category: 1,
            value: 0
        })
    );
    // Only numbers: the first numeric column is both axes
    assert_eq!(
        ChartSpec::select(&model(b"x,y\n1,2\n3,4\n")),
        Some(ChartSpec {
            category: 0,
            value: 0
        })
    );
    assert_eq!(ChartSpec::select(&model(b"a\nb\n")), None);
    println!("✓ chart axis selection");
}

#[test]
fn series_plots_blanks_as_zero() {
    let model = model(b"item,qty\nA,5\nB,\nC,-2\n");
    let spec = ChartSpec::select(&model).expect("spec");
    let series = spec.series(&model).expect("series");

    assert_eq!(series.x_label, "item");
    assert_eq!(series.y_label, "qty");
    assert_eq!(series.categories, vec!["A", "B", "C"]);
    assert_eq!(series.values, vec![5.0, 0.0, -2.0]);

    let png = render(&model, &ChartOptions::default())
        .expect("render")
        .expect("chart present");
    assert!(is_png(&png));
    println!("✓ blanks and negatives");
}

#[test]
fn many_bars_still_render() {
    let mut raw = String::from("label,value\n");
    for i in 0..300 {
        raw.push_str(&format!("row{i},{}\n", i % 17));
    }
    let png = render(&model(raw.as_bytes()), &ChartOptions::default())
        .expect("render")
        .expect("chart present");
    assert!(is_png(&png));
    println!("✓ 300 bars");
}

#[test]
fn all_blank_values_chart_as_zeros() {
    let model = model(b"name,score\nA,\nB,\n");
    let spec = ChartSpec::select(&model).expect("spec");
    assert_eq!(spec.series(&model).expect("series").values, vec![0.0, 0.0]);

    let png = render(&model, &ChartOptions::default())
        .expect("render")
        .expect("chart present");
    assert!(is_png(&png));
    println!("✓ blank column plotted flat");
}

#[test]
fn spec_from_another_table_is_rejected() {
    let wide = model(b"a,b,c,d\nx,1,2,3\n");
    let narrow = model(b"n\n1\n");
    let spec = ChartSpec {
        category: 0,
        value: 3,
    };

    assert!(spec.series(&wide).is_some());
    assert!(spec.series(&narrow).is_none());
    println!("✓ out-of-range chart columns");
}
