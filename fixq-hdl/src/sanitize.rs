use std::path::Path;

use crate::error::NetlistError;

/// Verilog-2001 reserved words; a sanitized name equal to one gets a `_` prefix
const KEYWORDS: &[&str] = &[
    "always", "and", "assign", "automatic", "begin", "buf", "bufif0", "bufif1", "case", "casex",
    "casez", "cell", "cmos", "config", "deassign", "default", "defparam", "design", "disable",
    "edge", "else", "end", "endcase", "endconfig", "endfunction", "endgenerate", "endmodule",
    "endprimitive", "endspecify", "endtable", "endtask", "event", "for", "force", "forever",
    "fork", "function", "generate", "genvar", "highz0", "highz1", "if", "ifnone", "incdir",
    "include", "initial", "inout", "input", "instance", "integer", "join", "large", "liblist",
    "library", "localparam", "macromodule", "medium", "module", "nand", "negedge", "nmos", "nor",
    "noshowcancelled", "not", "notif0", "notif1", "or", "output", "parameter", "pmos", "posedge",
    "primitive", "pull0", "pull1", "pulldown", "pullup", "pulsestyle_onevent",
    "pulsestyle_ondetect", "rcmos", "real", "realtime", "reg", "release", "repeat", "rnmos",
    "rpmos", "rtran", "rtranif0", "rtranif1", "scalared", "showcancelled", "signed", "small",
    "specify", "specparam", "strong0", "strong1", "supply0", "supply1", "table", "task", "time",
    "tran", "tranif0", "tranif1", "tri", "tri0", "tri1", "triand", "trior", "trireg", "unsigned",
    "use", "vectored", "wait", "wand", "weak0", "weak1", "while", "wire", "wor", "xnor", "xor",
];

/// Turn an arbitrary string into a legal Verilog module identifier.
///
/// Lower-cases ASCII, replaces every character outside `[a-z0-9_]` with `_`,
/// and prefixes `_` to a leading digit or a reserved word. Fails when no
/// character of `name` is legal as-is, i.e. stripping the illegal ones
/// would leave nothing.
///
/// # Example
/// ```
/// use fixq_hdl::sanitize_module_name;
///
/// assert_eq!(sanitize_module_name("My Filter!").unwrap(), "my_filter_");
/// assert_eq!(sanitize_module_name("2nd-stage").unwrap(), "_2nd_stage");
/// assert_eq!(sanitize_module_name("_").unwrap(), "_");
/// assert!(sanitize_module_name("!!!").is_err());
/// ```
pub fn sanitize_module_name(name: &str) -> Result<String, NetlistError> {
    let mut kept = 0usize;
    let mut out: String = name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                kept += 1;
                c
            } else {
                '_'
            }
        })
        .collect();

    if kept == 0 {
        return Err(NetlistError::InvalidModuleName(name.to_string()));
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) || KEYWORDS.contains(&out.as_str()) {
        out.insert(0, '_');
    }
    Ok(out)
}

/// Module name for a target file: the sanitized file stem
pub fn module_name_from_path(path: &Path) -> Result<String, NetlistError> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    sanitize_module_name(&stem)
}
