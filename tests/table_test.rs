mod common;

use common::SCORES_CSV;
use report_dashboard::error::ParseError;
use report_dashboard::table::{ColumnType, TabularModel};

#[test]
fn ingest_scores_file() {
    let model = TabularModel::ingest(SCORES_CSV).expect("parse");

    assert_eq!(model.columns(), &["name".to_string(), "score".to_string()]);
    assert_eq!(model.column_types(), &[ColumnType::Text, ColumnType::Numeric]);
    assert_eq!(model.row_count(), 2);
    assert_eq!(model.rows()[1], vec!["B".to_string(), "20".to_string()]);
    assert_eq!(model.numeric_value(0, 1), Some(10.0));
    println!("✓ name,score file parsed with inferred types");
}

#[test]
fn quoted_fields_keep_delimiters_and_quotes() {
    let raw = b"name,note\n\"Smith, Jane\",\"said \"\"hi\"\"\"\n";
    let model = TabularModel::ingest(raw).expect("parse");

    assert_eq!(model.rows()[0][0], "Smith, Jane");
    assert_eq!(model.rows()[0][1], "said \"hi\"");
    println!("✓ quoted delimiters and escaped quotes");
}

#[test]
fn unterminated_quote_is_rejected() {
    let err = TabularModel::ingest(b"a,b\n\"open,1\n").unwrap_err();
    assert!(matches!(err, ParseError::UnterminatedQuote { line: 2 }), "got {err:?}");

    // A literal quote earlier in the file does not balance it out
    let err = TabularModel::ingest(b"a,b\n5\",x\nq,\"c\n").unwrap_err();
    assert!(matches!(err, ParseError::UnterminatedQuote { line: 3 }), "got {err:?}");
    println!("✓ unterminated quote rejected");
}

#[test]
fn quotes_inside_unquoted_fields_are_literal() {
    let model = TabularModel::ingest(b"item,size\nTV,55\" screen\nRug,\"5' x 8'\"\n").expect("parse");

    assert_eq!(model.rows()[0][1], "55\" screen");
    assert_eq!(model.rows()[1][1], "5' x 8'");
    println!("✓ inch marks read as data");
}

#[test]
fn closed_quote_at_end_of_input() {
    let model = TabularModel::ingest(b"a,b\n1,\"x\ny\"").expect("parse");
    assert_eq!(model.rows()[0][1], "x\ny");
    println!("✓ quoted newline, no trailing newline");
}

#[test]
fn empty_input_is_rejected() {
    let err = TabularModel::ingest(b"").unwrap_err();
    assert!(matches!(err, ParseError::Empty), "got {err:?}");
    println!("✓ empty input rejected");
}

#[test]
fn header_only_file_has_no_rows() {
    let model = TabularModel::ingest(b"a,b\n").expect("parse");

    assert_eq!(model.column_count(), 2);
    assert_eq!(model.row_count(), 0);
    // No value contradicts a number
    assert_eq!(model.numeric_columns(), vec![0, 1]);
    println!("✓ header-only file");
}

#[test]
fn ragged_row_is_rejected_with_its_line() {
    let err = TabularModel::ingest(b"a,b\n1,2\n3\n").unwrap_err();
    match err {
        ParseError::RowWidth {
            row,
            expected,
            found,
        } => {
            assert_eq!((row, expected, found), (3, 2, 1));
        }
        other => panic!("expected RowWidth, got {other:?}"),
    }

    assert!(matches!(
        TabularModel::ingest(b"a,b\n1,2,3\n").unwrap_err(),
        ParseError::RowWidth { found: 3, .. }
    ));
    println!("✓ short and long rows rejected");
}

#[test]
fn bad_headers_are_rejected() {
    assert!(matches!(
        TabularModel::ingest(b"a,a\n1,2\n").unwrap_err(),
        ParseError::DuplicateColumn(name) if name == "a"
    ));
    assert!(matches!(
        TabularModel::ingest(b"a,,c\n1,2,3\n").unwrap_err(),
        ParseError::BlankColumn { index: 1 }
    ));
    println!("✓ duplicate and blank column names rejected");
}

#[test]
fn column_types_follow_every_value() {
    let raw = b"id,value,ratio,label\n1,10,0.5,x\n2,n/a,-1.25e2,y\n3,30, 4 ,z\n";
    let model = TabularModel::ingest(raw).expect("parse");

    assert_eq!(
        model.column_types(),
        &[
            ColumnType::Numeric,
            ColumnType::Text,
            ColumnType::Numeric,
            ColumnType::Text
        ]
    );
    assert_eq!(model.numeric_columns(), vec![0, 2]);
    assert_eq!(model.text_columns(), vec![1, 3]);
    assert_eq!(model.numeric_value(2, 2), Some(4.0));
    println!("✓ one non-numeric value makes a column text");
}

#[test]
fn blanks_do_not_break_numeric_columns() {
    let model = TabularModel::ingest(b"x,y\nA,1\nB,\nC,3\n").expect("parse");

    assert_eq!(model.column_type(1), Some(ColumnType::Numeric));
    assert_eq!(model.numeric_value(1, 1), None);
    assert_eq!(model.numeric_value(2, 1), Some(3.0));
    println!("✓ blank cells tolerated in numeric columns");
}

#[test]
fn all_blank_column_is_numeric() {
    let model = TabularModel::ingest(b"name,score\nA,\nB,\n").expect("parse");

    assert_eq!(model.column_types(), &[ColumnType::Text, ColumnType::Numeric]);
    assert_eq!(model.numeric_value(0, 1), None);
    println!("✓ all-blank column typed numeric");
}

#[test]
fn non_finite_values_are_text() {
    let model = TabularModel::ingest(b"v,w\nNaN,1\n2,inf\n").expect("parse");
    assert_eq!(model.column_types(), &[ColumnType::Text, ColumnType::Text]);
    println!("✓ NaN and inf are not numeric");
}

#[test]
fn constructor_validates_like_ingest() {
    let model = TabularModel::new(
        vec!["k".to_string()],
        vec![vec!["1".to_string()], vec!["2".to_string()]],
    )
    .expect("valid model");
    assert_eq!(model.column_type(0), Some(ColumnType::Numeric));

    let empty = TabularModel::new(Vec::new(), Vec::new()).expect("empty model");
    assert!(empty.is_empty());

    assert!(TabularModel::new(vec!["k".to_string()], vec![vec![]]).is_err());
    println!("✓ TabularModel::new");
}

#[test]
fn preview_limits_rows_but_reports_total() {
    let mut raw = String::from("n\n");
    for i in 0..120 {
        raw.push_str(&format!("{i}\n"));
    }
    let model = TabularModel::ingest(raw.as_bytes()).expect("parse");
    let preview = model.preview(50);

    assert_eq!(preview.rows.len(), 50);
    assert_eq!(preview.total_rows, 120);
    assert_eq!(preview.rows[49][0], "49");
    assert_eq!(preview.types, vec![ColumnType::Numeric]);
    println!("✓ preview");
}

#[test]
fn csv_export_reproduces_the_upload() {
    let model = TabularModel::ingest(SCORES_CSV).expect("parse");
    assert_eq!(model.to_csv().expect("export"), "name,score\nA,10\nB,20\n");

    let quoted = TabularModel::ingest(b"name,city\n\"Smith, Jane\",Oslo\n").expect("parse");
    assert_eq!(
        quoted.to_csv().expect("export"),
        "name,city\n\"Smith, Jane\",Oslo\n"
    );
    println!("✓ CSV export");
}
