//! MIME type and filename resolution for relayed documents.

pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

const EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("text/plain", "txt"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsx",
    ),
];

/// `type/subtype` without parameters.
fn essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or(mime).trim()
}

/// Rejects values that could not be sent as a part's content type.
fn is_usable_mime(mime: &str) -> bool {
    let is_token = |s: &str| {
        !s.is_empty()
            && s.bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$&^_.+-".contains(&b))
    };

    match essence(mime).split_once('/') {
        Some((kind, subtype)) => is_token(kind) && is_token(subtype),
        None => false,
    }
}

/// Picks the payload MIME type. An export target is authoritative; after
/// that the response header, then the metadata, then a binary fallback.
pub fn resolve_mime_type(
    export_mime_type: Option<&str>,
    content_type: Option<&str>,
    metadata_mime_type: Option<&str>,
) -> String {
    [export_mime_type, content_type, metadata_mime_type]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|mime| is_usable_mime(mime))
        .unwrap_or(FALLBACK_MIME_TYPE)
        .to_string()
}

pub fn extension_for(mime: &str) -> Option<&'static str> {
    let essence = essence(mime);
    EXTENSIONS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
}

/// Caller's name, else the document's own name, else the id with an
/// extension for the MIME type. Always sanitized.
pub fn resolve_filename(
    desired: Option<&str>,
    metadata_name: Option<&str>,
    document_id: &str,
    mime_type: &str,
) -> String {
    let chosen = [desired, metadata_name]
        .into_iter()
        .flatten()
        .find(|name| !name.trim().is_empty());

    match chosen {
        Some(name) => sanitize_filename(name),
        None => match extension_for(mime_type) {
            Some(ext) => sanitize_filename(&format!("{document_id}.{ext}")),
            None => sanitize_filename(document_id),
        },
    }
}

/// Replaces every character outside `[A-Za-z0-9_.-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '_' | '-' | '.' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_mime_wins() {
        assert_eq!(
            resolve_mime_type(Some("application/pdf"), Some("text/html"), Some("image/png")),
            "application/pdf"
        );
    }

    #[test]
    fn test_mime_precedence_falls_through() {
        assert_eq!(
            resolve_mime_type(None, Some("image/png"), Some("application/pdf")),
            "image/png"
        );
        assert_eq!(
            resolve_mime_type(None, None, Some("application/pdf")),
            "application/pdf"
        );
        assert_eq!(resolve_mime_type(None, None, None), FALLBACK_MIME_TYPE);

        // Garbage headers are skipped rather than forwarded
        assert_eq!(
            resolve_mime_type(None, Some("not a mime"), Some("text/plain")),
            "text/plain"
        );
        assert_eq!(resolve_mime_type(None, Some(""), None), FALLBACK_MIME_TYPE);
    }

    #[test]
    fn test_parameters_are_kept() {
        assert_eq!(
            resolve_mime_type(None, Some("text/plain; charset=utf-8"), None),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_extension_table() {
        assert_eq!(extension_for("application/pdf"), Some("pdf"));
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("text/plain; charset=utf-8"), Some("txt"));
        assert_eq!(extension_for("Text/Plain"), Some("txt"));
        assert_eq!(
            extension_for("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
            Some("xlsx")
        );
        assert_eq!(extension_for("application/zip"), None);
        assert_eq!(extension_for(FALLBACK_MIME_TYPE), None);
    }

    #[test]
    fn test_filename_precedence() {
        assert_eq!(
            resolve_filename(Some("mine.pdf"), Some("theirs.pdf"), "abc123", "application/pdf"),
            "mine.pdf"
        );
        assert_eq!(
            resolve_filename(None, Some("Q3 report.pdf"), "abc123", "application/pdf"),
            "Q3_report.pdf"
        );
        assert_eq!(
            resolve_filename(None, None, "abc123", "application/pdf"),
            "abc123.pdf"
        );
        assert_eq!(
            resolve_filename(None, Some(""), "abc123", "application/zip"),
            "abc123"
        );
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_filename("report-2024_v1.pdf"), "report-2024_v1.pdf");
        assert_eq!(sanitize_filename("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_filename("résumé (final).pdf"), "r_sum___final_.pdf");
        assert_eq!(sanitize_filename("a\"b\r\nc"), "a_b__c");
    }

    #[test]
    fn test_sanitize_is_idempotent_and_closed() {
        let samples = [
            "plain.txt",
            "spaces and tabs\t.docx",
            "日本語のファイル.pdf",
            "semi;colon=equals&amp.csv",
            "emoji 🎉.png",
            "",
        ];

        for sample in samples {
            let once = sanitize_filename(sample);
            assert_eq!(sanitize_filename(&once), once);
            assert!(
                once.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            );
            assert_eq!(once.chars().count(), sample.chars().count());
        }
    }
}
