//! Best-effort MIME classification: extension table first, then content
//! sniffing over the first bytes of the file.

use crate::fs::FileSystem;
use std::io::{self, Read};
use std::path::Path;

const SNIFF_BYTES: usize = 512;

pub fn detect(fs: &dyn FileSystem, path: &Path) -> io::Result<String> {
    if let Some(mime) = by_extension(path) {
        return Ok(mime.to_string());
    }
    let mut file = fs.open(path)?;
    let mut buf = Vec::with_capacity(SNIFF_BYTES);
    file.by_ref()
        .take(SNIFF_BYTES as u64)
        .read_to_end(&mut buf)?;
    Ok(sniff(&buf).to_string())
}

pub fn by_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "txt" | "text" | "log" | "ini" | "conf" | "cfg" => "text/plain; charset=utf-8",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "csv" => "text/csv",
        "xml" => "text/xml; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "ts" => "application/typescript",
        "jsx" => "text/jsx",
        "tsx" => "text/tsx",
        "vue" => "text/vue",
        "json" => "application/json",
        "yaml" | "yml" => "application/x-yaml",
        "toml" => "application/toml",
        "sh" | "bash" | "zsh" | "fish" => "text/x-shellscript",
        "sql" => "text/x-sql",
        "go" => "text/x-go",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "c" | "h" => "text/x-c",
        "cpp" | "hpp" | "cc" => "text/x-c++",
        "cs" => "text/x-csharp",
        "java" => "text/x-java",
        "scala" => "text/x-scala",
        "rb" => "text/x-ruby",
        "php" => "text/x-php",
        "pl" => "text/x-perl",
        "swift" => "text/x-swift",
        "kt" => "text/x-kotlin",
        "ex" | "exs" => "text/x-elixir",
        "hs" => "text/x-haskell",
        "lua" => "text/x-lua",
        "r" => "text/x-r",
        "jl" => "text/x-julia",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "wasm" => "application/wasm",
        _ => return None,
    };
    Some(mime)
}

fn sniff(head: &[u8]) -> &'static str {
    if let Some(kind) = infer::get(head) {
        return kind.mime_type();
    }
    if head.is_empty() {
        return "text/plain; charset=utf-8";
    }
    let printable = !head
        .iter()
        .any(|b| matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F));
    if printable && valid_utf8_prefix(head) {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

// A multi-byte character may be cut at the sniff boundary.
fn valid_utf8_prefix(head: &[u8]) -> bool {
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    #[test]
    fn extension_table_wins() {
        let fs = MemFs::new();
        fs.write("/a/notes.md", "# hi");
        assert_eq!(detect(&fs, Path::new("/a/notes.md")).unwrap(), "text/markdown");
    }

    #[test]
    fn sniffs_unknown_extensions() {
        let fs = MemFs::new();
        fs.write("/a/blob.bin", vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]);
        fs.write("/a/README", "plain words");
        fs.write("/a/raw.dat", vec![0u8, 1, 2, 3, 0xff]);
        assert_eq!(detect(&fs, Path::new("/a/blob.bin")).unwrap(), "image/png");
        assert_eq!(
            detect(&fs, Path::new("/a/README")).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            detect(&fs, Path::new("/a/raw.dat")).unwrap(),
            "application/octet-stream"
        );
    }

    #[test]
    fn unreadable_files_report_errors() {
        let fs = MemFs::new();
        fs.write("/a/secret", "x");
        fs.deny("/a/secret");
        assert!(detect(&fs, Path::new("/a/secret")).is_err());
    }
}
