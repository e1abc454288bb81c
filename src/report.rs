use crate::error::ComposeError;
use crate::table::TabularModel;
use chrono::{DateTime, Local};
use log::debug;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Rect, Rgb,
};
use std::ops::Range;

// A4, in millimetres
const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

const ROW_HEIGHT: f32 = 7.0;
const CELL_FONT_SIZE: f32 = 9.0;
const CELL_PADDING: f32 = 1.5;
const TITLE_FONT_SIZE: f32 = 18.0;
const BODY_FONT_SIZE: f32 = 10.0;
const SPACER: f32 = 4.0;

// Images are embedded at this density before scaling into their boxes
const IMAGE_DPI: f32 = 300.0;

const MM_PER_PT: f32 = 25.4 / 72.0;

/// Default report title
pub const DEFAULT_TITLE: &str = "Auto-Generated Report";

/// Box an image is scaled into, in millimetres
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitBox {
    pub width: f32,
    pub height: f32,
}

impl FitBox {
    /// Masthead logo box, 100x50 pt
    pub const LOGO: FitBox = FitBox {
        width: 100.0 * MM_PER_PT,
        height: 50.0 * MM_PER_PT,
    };

    /// Chart box, 400x300 pt
    pub const CHART: FitBox = FitBox {
        width: 400.0 * MM_PER_PT,
        height: 300.0 * MM_PER_PT,
    };

    /// Size an image of `px_width` x `px_height` takes inside the box
    ///
    /// The aspect ratio is preserved, so one side touches the box and the
    /// other may fall short of it.
    pub fn fit(&self, px_width: u32, px_height: u32) -> (f32, f32) {
        if px_width == 0 || px_height == 0 {
            return (0.0, 0.0);
        }
        let scale = (self.width / px_width as f32).min(self.height / px_height as f32);
        (px_width as f32 * scale, px_height as f32 * scale)
    }
}

/// What an image block shows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageRole {
    Logo,
    Chart,
}

impl ImageRole {
    fn as_str(&self) -> &'static str {
        match self {
            ImageRole::Logo => "logo",
            ImageRole::Chart => "chart",
        }
    }
}

/// Decoded image placed into a fixed box
#[derive(Clone, Debug)]
pub struct ImageBlock {
    pub role: ImageRole,
    pub image: image::DynamicImage,
    pub fit: FitBox,
}

/// Table block: header row plus every data row of the model
#[derive(Clone, Debug, PartialEq)]
pub struct TableBlock {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableBlock {
    /// Rows drawn in the table, header included
    pub fn rendered_rows(&self) -> usize {
        self.rows.len() + 1
    }
}

/// One piece of report content
#[derive(Clone, Debug)]
pub enum Block {
    Image(ImageBlock),
    Title(String),
    Timestamp(String),
    Table(TableBlock),
}

/// Laid-out report, ready to be serialized
///
/// Blocks always come in the order logo, title, timestamp, table, chart,
/// with the two image blocks present only when an image was supplied.
#[derive(Clone, Debug)]
pub struct ReportDocument {
    title: String,
    blocks: Vec<Block>,
}

/// Builds report documents with a fixed structure
#[derive(Clone, Debug)]
pub struct ReportComposer {
    title: String,
}

impl Default for ReportComposer {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE)
    }
}

impl ReportComposer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Lay out the report blocks
    ///
    /// # Arguments
    /// * `model` - Table to render; must have at least one column
    /// * `chart` - Encoded chart image, if one was produced
    /// * `logo` - Encoded logo image (PNG or JPEG), if one was uploaded
    /// * `generated_at` - Time printed in the timestamp block
    ///
    /// # Errors
    /// * `ComposeError::EmptyModel` if the model has no columns
    /// * `ComposeError::Image` if an image cannot be decoded
    pub fn layout(
        &self,
        model: &TabularModel,
        chart: Option<&[u8]>,
        logo: Option<&[u8]>,
        generated_at: DateTime<Local>,
    ) -> Result<ReportDocument, ComposeError> {
        if model.is_empty() {
            return Err(ComposeError::EmptyModel);
        }

        let mut blocks = Vec::with_capacity(5);
        if let Some(bytes) = logo {
            blocks.push(Block::Image(decode_image(ImageRole::Logo, bytes, FitBox::LOGO)?));
        }
        blocks.push(Block::Title(self.title.clone()));
        blocks.push(Block::Timestamp(format!(
            "Generated on: {}",
            generated_at.format("%Y-%m-%d %H:%M:%S")
        )));
        blocks.push(Block::Table(TableBlock {
            header: model.columns().to_vec(),
            rows: model.rows().to_vec(),
        }));
        if let Some(bytes) = chart {
            blocks.push(Block::Image(decode_image(ImageRole::Chart, bytes, FitBox::CHART)?));
        }

        Ok(ReportDocument {
            title: self.title.clone(),
            blocks,
        })
    }

    /// Lay out and serialize a report in one step
    ///
    /// # Returns
    /// * `Result<Vec<u8>, ComposeError>` - PDF bytes or an error
    pub fn compose(
        &self,
        model: &TabularModel,
        chart: Option<&[u8]>,
        logo: Option<&[u8]>,
    ) -> Result<Vec<u8>, ComposeError> {
        self.layout(model, chart, logo, Local::now())?.render()
    }
}

fn decode_image(role: ImageRole, bytes: &[u8], fit: FitBox) -> Result<ImageBlock, ComposeError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ComposeError::Image {
        role: role.as_str(),
        reason: e.to_string(),
    })?;

    // Alpha channels are flattened away; the PDF page is white anyway
    Ok(ImageBlock {
        role,
        image: image::DynamicImage::ImageRgb8(decoded.to_rgb8()),
        fit,
    })
}

/// Splits table rows over pages, one range of data rows per page
///
/// Every page repeats the header row, so a page that fits `n` rows carries
/// `n - 1` data rows. When the current page is too short for the header plus
/// one row, the table starts on the next page instead.
///
/// # Arguments
/// * `total` - Number of data rows
/// * `first_page_space` - Height left on the current page, in mm
/// * `page_space` - Usable height of a fresh page, in mm
/// * `row_height` - Height of one row, in mm
///
/// # Returns
/// * `(starts_on_new_page, ranges)`
pub fn paginate_rows(
    total: usize,
    first_page_space: f32,
    page_space: f32,
    row_height: f32,
) -> (bool, Vec<Range<usize>>) {
    let data_rows_in = |space: f32| ((space / row_height).floor() as usize).saturating_sub(1);

    let full_page = data_rows_in(page_space).max(1);
    let mut first = data_rows_in(first_page_space);
    let starts_on_new_page = first == 0;
    if starts_on_new_page {
        first = full_page;
    }

    let mut ranges = Vec::new();
    let mut start = 0;
    let mut capacity = first;
    loop {
        let end = (start + capacity).min(total);
        ranges.push(start..end);
        if end >= total {
            break;
        }
        start = end;
        capacity = full_page;
    }

    (starts_on_new_page, ranges)
}

impl ReportDocument {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn table_blocks(&self) -> Vec<&TableBlock> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Table(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn image_blocks(&self) -> Vec<&ImageBlock> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Image(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    /// Serialize the document to PDF bytes
    pub fn render(&self) -> Result<Vec<u8>, ComposeError> {
        let (doc, page, layer) =
            PdfDocument::new(&self.title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Page 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(pdf_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?;

        let mut writer = PageWriter {
            layer: doc.get_page(page).get_layer(layer),
            doc,
            y: PAGE_HEIGHT - MARGIN,
            pages: 1,
            regular,
            bold,
        };

        for block in &self.blocks {
            match block {
                Block::Image(image) => writer.image(image),
                Block::Title(text) => writer.title(text),
                Block::Timestamp(text) => writer.timestamp(text),
                Block::Table(table) => writer.table(table),
            }
        }

        debug!("Rendered '{}' over {} page(s)", self.title, writer.pages);
        writer.doc.save_to_bytes().map_err(pdf_error)
    }
}

/// Cursor over the pages of a document being written
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    /// Distance of the cursor from the bottom edge, in mm
    y: f32,
    pages: usize,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl PageWriter {
    fn new_page(&mut self) {
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Page {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn space_left(&self) -> f32 {
        self.y - MARGIN
    }

    fn ensure(&mut self, height: f32) {
        if self.space_left() < height {
            self.new_page();
        }
    }

    fn image(&mut self, block: &ImageBlock) {
        let (px_width, px_height) = (block.image.width(), block.image.height());
        let (width, height) = block.fit.fit(px_width, px_height);
        if width <= 0.0 {
            return;
        }

        if block.role == ImageRole::Chart {
            self.y -= SPACER;
        }
        self.ensure(height);

        let natural_width = px_width as f32 / IMAGE_DPI * 25.4;
        let scale = width / natural_width;
        Image::from_dynamic_image(&block.image).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(MARGIN)),
                translate_y: Some(Mm(self.y - height)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );
        self.y -= height + SPACER;
    }

    fn title(&mut self, text: &str) {
        let line = TITLE_FONT_SIZE * MM_PER_PT;
        self.ensure(line + SPACER);
        self.y -= line;
        self.layer.set_fill_color(black());
        self.layer
            .use_text(text, TITLE_FONT_SIZE, Mm(MARGIN), Mm(self.y), &self.bold);
        self.y -= SPACER;
    }

    fn timestamp(&mut self, text: &str) {
        let line = BODY_FONT_SIZE * MM_PER_PT;
        self.ensure(line + SPACER);
        self.y -= line;
        self.layer.set_fill_color(black());
        self.layer
            .use_text(text, BODY_FONT_SIZE, Mm(MARGIN), Mm(self.y), &self.regular);
        self.y -= SPACER * 2.0;
    }

    fn table(&mut self, table: &TableBlock) {
        let col_width = CONTENT_WIDTH / table.header.len().max(1) as f32;
        let (new_page, pages) = paginate_rows(
            table.rows.len(),
            self.space_left(),
            PAGE_HEIGHT - 2.0 * MARGIN,
            ROW_HEIGHT,
        );
        if new_page {
            self.new_page();
        }

        for (i, range) in pages.into_iter().enumerate() {
            if i > 0 {
                self.new_page();
            }
            self.row(&table.header, col_width, true);
            for row in &table.rows[range] {
                self.row(row, col_width, false);
            }
        }
    }

    fn row(&mut self, cells: &[String], col_width: f32, header: bool) {
        let top = self.y;
        let bottom = top - ROW_HEIGHT;
        let font = if header { &self.bold } else { &self.regular };

        self.layer.set_outline_color(black());
        self.layer.set_outline_thickness(0.5);

        for (i, text) in cells.iter().enumerate() {
            let left = MARGIN + i as f32 * col_width;
            let cell = Rect::new(Mm(left), Mm(bottom), Mm(left + col_width), Mm(top));

            if header {
                self.layer.set_fill_color(grey());
                self.layer.add_rect(cell.with_mode(PaintMode::FillStroke));
                self.layer.set_fill_color(whitesmoke());
            } else {
                self.layer.add_rect(cell.with_mode(PaintMode::Stroke));
                self.layer.set_fill_color(black());
            }

            let (shown, text_width) = fit_text(text, col_width - 2.0 * CELL_PADDING);
            let x = left + (col_width - text_width) / 2.0;
            let baseline = bottom + (ROW_HEIGHT - CELL_FONT_SIZE * MM_PER_PT * 0.7) / 2.0;
            self.layer
                .use_text(shown, CELL_FONT_SIZE, Mm(x), Mm(baseline), font);
        }

        self.layer.set_fill_color(black());
        self.y = bottom;
    }
}

/// Truncate `text` to an approximate width, returning it with that width
fn fit_text(text: &str, max_width: f32) -> (String, f32) {
    // Helvetica averages about half an em per glyph
    let glyph = CELL_FONT_SIZE * 0.5 * MM_PER_PT;
    let max_chars = (max_width / glyph).floor().max(1.0) as usize;
    let count = text.chars().count();

    let shown: String = if count <= max_chars {
        text.to_string()
    } else if max_chars > 3 {
        let mut cut: String = text.chars().take(max_chars - 3).collect();
        cut.push_str("...");
        cut
    } else {
        text.chars().take(max_chars).collect()
    };

    let width = shown.chars().count() as f32 * glyph;
    (shown, width)
}

fn black() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}

fn grey() -> Color {
    Color::Rgb(Rgb::new(0.5, 0.5, 0.5, None))
}

fn whitesmoke() -> Color {
    Color::Rgb(Rgb::new(0.96, 0.96, 0.96, None))
}

fn pdf_error<E: std::fmt::Display>(e: E) -> ComposeError {
    ComposeError::Pdf(e.to_string())
}
