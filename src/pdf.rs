use lopdf::Document;
use regex::bytes::Regex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Text of one page, 1-based page number.
#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// An opened PDF. Pages are extracted lazily, one at a time.
pub struct PdfDocument {
    path: PathBuf,
    doc: Document,
    page_numbers: Vec<u32>,
}

impl PdfDocument {
    /// Open a PDF. Missing files and documents lopdf cannot load (or that are encrypted) fail here;
    /// damage confined to a single page is tolerated later, in `pages()`.
    /// A broken cross-reference table is rebuilt by scanning for object headers.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let doc = match Document::load_mem(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("{}: {}, rebuilding cross-reference table", path.display(), e);
                rebuild_xref(&bytes)
                    .and_then(|repaired| Document::load_mem(&repaired).ok())
                    .ok_or_else(|| Error::UnreadableDocument {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })?
            }
        };
        if doc.is_encrypted() {
            return Err(Error::UnreadableDocument {
                path: path.to_path_buf(),
                reason: "document is encrypted".to_string(),
            });
        }
        let mut page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        page_numbers.sort_unstable();
        log::debug!("opened {} ({} pages)", path.display(), page_numbers.len());
        Ok(Self {
            path: path.to_path_buf(),
            doc,
            page_numbers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.page_numbers.len()
    }

    /// Page texts in page order. A page whose content stream cannot be decoded yields empty text.
    pub fn pages(&self) -> impl Iterator<Item = PageText> + '_ {
        self.page_numbers.iter().map(move |&number| {
            let text = match self.doc.extract_text(&[number]) {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("{}: page {} skipped: {}", self.path.display(), number, e);
                    String::new()
                }
            };
            PageText { number, text }
        })
    }
}

fn object_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?-u)(?:^|[\r\n])[ \t]*(\d+)[ \t]+(\d+)[ \t]+obj\b").expect("object header regex")
    })
}

fn reference_regex(key: &str) -> Regex {
    Regex::new(&format!(r"(?-u)/{}\s*(\d+)\s+(\d+)\s+R\b", key)).expect("reference regex")
}

fn parse_number<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Last `/Key N G R` in the file.
fn last_reference(data: &[u8], key: &str) -> Option<(u32, u16)> {
    let caps = reference_regex(key).captures_iter(data).last()?;
    Some((parse_number(&caps[1])?, parse_number(&caps[2])?))
}

/// The object whose body holds `/Type /Catalog`, for files with no usable trailer.
fn catalog_object(data: &[u8], objects: &BTreeMap<u32, (usize, u16)>) -> Option<(u32, u16)> {
    let catalog = Regex::new(r"(?-u)/Type\s*/Catalog\b").expect("catalog regex");
    let at = catalog.find(data)?.start();
    objects
        .iter()
        .filter(|(_, (offset, _))| *offset < at)
        .max_by_key(|(_, (offset, _))| *offset)
        .map(|(&id, &(_, generation))| (id, generation))
}

/// Copy of `data` with a fresh xref table and trailer appended, built from every
/// `N G obj` header in the file. Later definitions of an object win.
fn rebuild_xref(data: &[u8]) -> Option<Vec<u8>> {
    let mut objects: BTreeMap<u32, (usize, u16)> = BTreeMap::new();
    for caps in object_header_regex().captures_iter(data) {
        let (Some(id_match), Some(id), Some(generation)) =
            (caps.get(1), parse_number::<u32>(&caps[1]), parse_number::<u16>(&caps[2]))
        else {
            continue;
        };
        objects.insert(id, (id_match.start(), generation));
    }
    let size = objects.keys().next_back()? + 1;
    let root = last_reference(data, "Root")
        .filter(|(id, _)| objects.contains_key(id))
        .or_else(|| catalog_object(data, &objects))?;
    log::info!("rebuilt cross-reference table with {} objects", objects.len());

    let mut out = data.to_vec();
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    let xref_offset = out.len();
    let mut table = format!("xref\n0 {}\n", size);
    for id in 0..size {
        match objects.get(&id) {
            Some((offset, generation)) => {
                let _ = write!(table, "{:010} {:05} n\r\n", offset, generation);
            }
            None => table.push_str("0000000000 65535 f\r\n"),
        }
    }
    let _ = write!(table, "trailer\n<< /Size {} /Root {} {} R", size, root.0, root.1);
    if let Some((id, generation)) = last_reference(data, "Encrypt") {
        let _ = write!(table, " /Encrypt {} {} R", id, generation);
    }
    let _ = write!(table, " >>\nstartxref\n{}\n%%EOF\n", xref_offset);
    out.extend_from_slice(table.as_bytes());
    Some(out)
}

/// Cheap pre-flight check used by the front end before handing a path to the core.
pub fn validate_document_file(path: &Path) -> std::result::Result<(), String> {
    use std::io::Read;

    if !path.exists() {
        return Err("File not found.".to_string());
    }
    let metadata = std::fs::metadata(path).map_err(|e| e.to_string())?;
    if metadata.len() > 50 * 1024 * 1024 {
        return Err("File too large (max 50MB).".to_string());
    }
    let mut f = std::fs::File::open(path).map_err(|e| format!("Could not open: {}", e))?;
    let mut header = [0u8; 8];
    if f.read(&mut header).unwrap_or(0) < 5 {
        return Err("Not a valid PDF (could not read header).".to_string());
    }
    if !header.starts_with(b"%PDF-") {
        return Err("Not a valid PDF file.".to_string());
    }
    Ok(())
}
