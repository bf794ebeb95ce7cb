//! Boundaries to the outside world: PDF rendering, image cleanup, OCR, the
//! questionnaire workbook and the answer sheets.

pub mod ocr;
pub mod preprocess;
pub mod raster;
pub mod sink;
pub mod workbook;

#[cfg(test)]
mod tests;
