use crate::error::{Error, Result};
use crate::models::ScoredLabel;
use std::fs;
use std::path::{Path, PathBuf};

/// Sidecar path: the original's extension swapped for `ext`, same directory,
/// basename case untouched. Downstream photo managers pair strictly by
/// filename.
pub fn sidecar_path(original: &Path, ext: &str) -> PathBuf {
    original.with_extension(ext)
}

/// Merged subject list: every translated term first, then every English
/// term, de-duplicated case-sensitively with first occurrence winning.
pub fn merge_terms(labels: &[ScoredLabel], translated: &[String]) -> Vec<String> {
    let mut merged = Vec::with_capacity(translated.len() + labels.len());
    for term in translated.iter().chain(labels.iter().map(|l| &l.term)) {
        if !merged.contains(term) {
            merged.push(term.clone());
        }
    }
    merged
}

fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Minimal XMP packet with the merged terms as a `dc:subject` bag. The bag
/// is the unordered multi-valued keywords field photo managers read.
pub fn render_xmp(terms: &[String]) -> String {
    let mut doc = String::new();
    doc.push_str("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
    doc.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    doc.push_str(" <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
    doc.push_str(
        "  <rdf:Description rdf:about=\"\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n",
    );
    doc.push_str("   <dc:subject>\n    <rdf:Bag>\n");
    for term in terms {
        doc.push_str("     <rdf:li>");
        doc.push_str(&xml_escape(term));
        doc.push_str("</rdf:li>\n");
    }
    doc.push_str("    </rdf:Bag>\n   </dc:subject>\n");
    doc.push_str("  </rdf:Description>\n </rdf:RDF>\n</x:xmpmeta>\n");
    doc.push_str("<?xpacket end=\"w\"?>\n");
    doc
}

/// Emits the sidecar atomically: the document goes to a temp file in the
/// same directory, then a rename makes it visible. A concurrent reader sees
/// either no sidecar or a complete one.
pub fn write_sidecar(original: &Path, ext: &str, terms: &[String]) -> Result<PathBuf> {
    let target = sidecar_path(original, ext);
    let dir = target
        .parent()
        .ok_or_else(|| Error::Path(format!("No parent directory for {}", target.display())))?;
    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Path(format!("Unusable sidecar name for {}", target.display())))?;

    let tmp = dir.join(format!(".{file_name}.tmp"));
    fs::write(&tmp, render_xmp(terms))?;
    if let Err(err) = fs::rename(&tmp, &target) {
        fs::remove_file(&tmp).ok();
        return Err(err.into());
    }
    Ok(target)
}
