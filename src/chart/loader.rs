use std::fs;
use std::path::Path;

use anyhow::Result;

use crate::chart::bmson;
use crate::chart::compiler::{Chart, ChartCompiler};
use crate::chart::error::ChartError;
use crate::config::CompileConfig;

/// Load and compile a chart file, dispatching on the extension.
///
/// The single hard-failing entry point: unreadable files, unknown formats
/// and chart text yielding no timeline surface as errors here. Everything
/// recoverable was already logged and substituted inside the compiler.
pub fn load_chart(path: &Path, config: &CompileConfig) -> Result<Chart> {
    let raw = fs::read(path).map_err(|source| ChartError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let chart = match extension.as_str() {
        "bms" | "bme" | "bml" | "pms" => {
            let text = decode_chart_bytes(&raw);
            ChartCompiler::new(config.clone()).compile(&text, extension == "pms")?
        }
        "bmson" => bmson::compile(&raw, config)?,
        _ => {
            return Err(ChartError::UnsupportedFormat { extension }.into());
        }
    };

    Ok(chart)
}

/// Decode chart bytes to text: UTF-8 BOM, then UTF-8, then Shift_JIS, then
/// EUC-JP, falling back to lossy Shift_JIS. Charts in the wild predate any
/// declared encoding.
pub fn decode_chart_bytes(raw: &[u8]) -> String {
    if raw.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(&raw[3..]).into_owned();
    }

    if let Ok(s) = std::str::from_utf8(raw) {
        return s.to_string();
    }

    let (decoded, _, had_errors) = encoding_rs::SHIFT_JIS.decode(raw);
    if !had_errors {
        return decoded.into_owned();
    }

    let (decoded, _, had_errors) = encoding_rs::EUC_JP.decode(raw);
    if !had_errors {
        return decoded.into_owned();
    }

    let (decoded, _, _) = encoding_rs::SHIFT_JIS.decode(raw);
    decoded.into_owned()
}
