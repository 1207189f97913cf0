//! Text rendering for the checker's output.

use std::fmt::Write;

use symcontainer::{Diagnostics, IsfResult, NearestSymbol, Symbol, SymbolContainer};

/// Parse `0x`-prefixed hex or plain decimal.
pub fn parse_address(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid address `{}`: {}", s, e))
}

pub fn render_diagnostics(diags: &Diagnostics) -> String {
    let mut out = String::new();
    for d in diags {
        let _ = writeln!(out, "{}", d);
    }
    let _ = writeln!(out, "{} problem(s) found", diags.len());
    out
}

pub fn render_summary(c: &SymbolContainer) -> String {
    let pointer = c
        .pointer_size()
        .map_or_else(|| "unknown".to_string(), |p| p.to_string());
    format!(
        "format {}: {} base types, {} user types, {} enums, {} symbols, pointer size {}",
        c.format_version(),
        c.base_type_names().count(),
        c.user_type_names().count(),
        c.enum_names().count(),
        c.symbol_names().count(),
        pointer
    )
}

/// One line per field: offset, size, name and type. Bitfields also show
/// the mask of their bits within the storage unit.
pub fn render_type(c: &SymbolContainer, name: &str) -> IsfResult<String> {
    let layout = c.user_type(name)?;
    let mut out = String::new();
    let _ = writeln!(out, "{} {} (length {:#x})", layout.kind, layout.name, layout.length);
    for f in &layout.fields {
        let size = f.size.map_or_else(|| "?".to_string(), |s| format!("{:#x}", s));
        let _ = write!(
            out,
            "  +{:#06x} [{:>6}] {}: {}",
            f.offset,
            size,
            f.name,
            c.describe(&f.descriptor)
        );
        if let Some(mask) = f.bits.and_then(|b| b.mask()) {
            let _ = write!(out, " mask {:#x}", mask);
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn render_symbol(name: &str, s: &Symbol) -> String {
    match &s.linkage_name {
        Some(linkage) => format!("{} = {:#x} ({})", name, s.address, linkage),
        None => format!("{} = {:#x}", name, s.address),
    }
}

pub fn render_nearest(near: &NearestSymbol<'_>) -> String {
    if near.displacement == 0 {
        near.name.to_string()
    } else {
        format!("{}+{:#x}", near.name, near.displacement)
    }
}
