//! Text extraction for binary document formats (PDF, DOCX, PPTX).
//!
//! Each extractor takes raw bytes and returns one or more text units. PDFs
//! yield one unit per page and presentations one unit per slide, each with a
//! location hint; Word documents yield a single unit with one line per
//! paragraph. Errors are returned as [`LoadFailure`], never panics.

use std::io::Read;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::LoadFailure;
use crate::models::LoadedText;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

pub fn extract_pdf(bytes: &[u8]) -> Result<Vec<LoadedText>, LoadFailure> {
    // pdf-extract panics on some malformed files.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| LoadFailure::Pdf("parser panicked on malformed PDF".to_string()))?
        .map_err(|e| LoadFailure::Pdf(e.to_string()))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| LoadedText {
            text,
            hint: Some(format!("page {}", i + 1)),
        })
        .collect())
}

pub fn extract_docx(bytes: &[u8]) -> Result<Vec<LoadedText>, LoadFailure> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry_bounded(&mut archive, "word/document.xml")?;
    let text = collect_text_runs(&xml, b"p")?;
    Ok(vec![LoadedText { text, hint: None }])
}

pub fn extract_pptx(bytes: &[u8]) -> Result<Vec<LoadedText>, LoadFailure> {
    let mut archive = open_archive(bytes)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|n| {
            let number = n
                .trim_start_matches("ppt/slides/slide")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX);
            (number, n.to_string())
        })
        .collect();
    if slides.is_empty() {
        return Err(LoadFailure::Ooxml("no slides found".to_string()));
    }
    slides.sort();

    let mut units = Vec::with_capacity(slides.len());
    for (number, name) in slides {
        let xml = read_entry_bounded(&mut archive, &name)?;
        units.push(LoadedText {
            text: collect_text_runs(&xml, b"p")?,
            hint: Some(format!("slide {}", number)),
        });
    }
    Ok(units)
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, LoadFailure> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| LoadFailure::Ooxml(e.to_string()))
}

fn read_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, LoadFailure> {
    let entry = archive
        .by_name(name)
        .map_err(|e| LoadFailure::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| LoadFailure::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(LoadFailure::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Concatenate `<*:t>` text runs, emitting a newline at the end of each
/// `paragraph` element. Works for both `w:` (Word) and `a:` (DrawingML).
fn collect_text_runs(xml: &[u8], paragraph: &[u8]) -> Result<String, LoadFailure> {
    let mut out = String::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| LoadFailure::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text = false;
                } else if name.as_ref() == paragraph && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(LoadFailure::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}
