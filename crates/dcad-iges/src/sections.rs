//! IGES fixed-column structure: section split, global section, directory
//! entries, and parameter records.
//!
//! An IGES file is a sequence of 80-column lines. Column 73 carries the
//! section letter (S/G/D/P/T), columns 74-80 the sequence number, columns
//! 1-72 the data. Directory entries occupy exactly two lines of 8-wide
//! right-justified fields; parameter data is free text in columns 1-64
//! with the owning directory entry in columns 65-72.

use crate::error::IgesError;
use dcad_model::Warnings;

/// A file split into its five sections (data columns only).
#[derive(Debug, Default)]
pub struct Sections {
    /// Start section lines (columns 1-72).
    pub start: Vec<String>,
    /// Global section lines.
    pub global: Vec<String>,
    /// Directory section lines.
    pub directory: Vec<String>,
    /// Parameter section lines (columns 1-64 only).
    pub parameter: Vec<String>,
}

/// Split a file into sections by the letter in column 73.
///
/// Lines longer than 80 columns are skipped with a warning; shorter lines
/// are accepted and padded as needed.
pub fn split_sections(text: &str, warnings: &mut Warnings) -> Result<Sections, IgesError> {
    let mut sections = Sections::default();
    let mut seen_any = false;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if line.len() > 80 {
            warnings.push(format!("line {}: exceeds 80 columns, skipped", lineno + 1));
            continue;
        }
        if !line.is_ascii() {
            warnings.push(format!("line {}: non-ASCII data, skipped", lineno + 1));
            continue;
        }
        let padded = format!("{line:<80}");
        let letter = padded.as_bytes()[72] as char;
        let data = padded[..72].to_string();
        seen_any = true;
        match letter {
            'S' => sections.start.push(data),
            'G' => sections.global.push(data),
            'D' => sections.directory.push(data),
            'P' => sections.parameter.push(padded[..64].to_string()),
            'T' => break,
            other => {
                warnings.push(format!(
                    "line {}: unknown section letter '{other}', skipped",
                    lineno + 1
                ));
            }
        }
    }

    if !seen_any {
        return Err(IgesError::Malformed("no 80-column sections found".into()));
    }
    Ok(sections)
}

/// The global section fields the codec consumes.
#[derive(Debug, Clone)]
pub struct GlobalSection {
    /// Parameter delimiter (default `,`).
    pub param_delim: char,
    /// Record delimiter (default `;`).
    pub record_delim: char,
    /// Sending product identification.
    pub product_id: String,
    /// File name as recorded by the sender.
    pub file_name: String,
    /// Model space scale.
    pub model_scale: f64,
    /// Units flag (1 = inches, 2 = mm, ...).
    pub units_flag: i64,
    /// Units name (used when the flag says "named unit").
    pub units_name: String,
    /// Minimum resolution declared by the sender.
    pub resolution: f64,
    /// Author.
    pub author: String,
    /// Organization.
    pub organization: String,
}

impl Default for GlobalSection {
    fn default() -> Self {
        Self {
            param_delim: ',',
            record_delim: ';',
            product_id: String::new(),
            file_name: String::new(),
            model_scale: 1.0,
            units_flag: 2,
            units_name: "MM".into(),
            resolution: 1e-6,
            author: String::new(),
            organization: String::new(),
        }
    }
}

impl GlobalSection {
    /// Millimeters per file unit from the units flag.
    ///
    /// Flag 3 defers to the units name; an unknown flag keeps the given
    /// fallback with a warning.
    pub fn unit_scale(&self, fallback: f64, warnings: &mut Warnings) -> f64 {
        match self.units_flag {
            1 => 25.4,
            2 => 1.0,
            3 => match self.units_name.trim_matches(|c: char| !c.is_ascii_alphabetic()) {
                "IN" | "INCH" => 25.4,
                "MM" => 1.0,
                "FT" => 304.8,
                "MI" => 1_609_344.0,
                "M" => 1000.0,
                "KM" => 1e6,
                "CM" => 10.0,
                other => {
                    warnings.push(format!("unknown units name '{other}', assuming fallback"));
                    fallback
                }
            },
            4 => 304.8,
            5 => 1_609_344.0,
            6 => 1000.0,
            7 => 1e6,
            8 => 0.0254,
            9 => 0.001,
            10 => 10.0,
            11 => 1e-6,
            other => {
                warnings.push(format!("unknown units flag {other}, assuming fallback"));
                fallback
            }
        }
    }

    /// Parse the concatenated global section text.
    pub fn parse(lines: &[String], warnings: &mut Warnings) -> Self {
        let text: String = lines.join("");
        let text = text.trim_end().to_string();
        let mut global = GlobalSection::default();

        // The two delimiter declarations come first and are parsed
        // positionally; an empty field keeps the default.
        let mut rest = text.as_str();
        for which in 0..2 {
            let (delim, remainder) = take_delimiter_field(rest, &global, warnings);
            if let Some(d) = delim {
                if which == 0 {
                    global.param_delim = d;
                } else {
                    global.record_delim = d;
                }
            }
            rest = remainder;
        }

        let fields = split_fields(rest, global.param_delim, global.record_delim);
        let hollerith = |idx: usize, warnings: &mut Warnings| -> String {
            fields
                .get(idx)
                .map(|f| parse_hollerith(f, warnings))
                .unwrap_or_default()
        };
        let number = |idx: usize, default: f64, warnings: &mut Warnings| -> f64 {
            match fields.get(idx).map(|f| f.trim()) {
                None | Some("") => default,
                Some(f) => parse_real(f).unwrap_or_else(|| {
                    warnings.push(format!("global field {}: bad number '{f}', using 0", idx + 3));
                    0.0
                }),
            }
        };

        // Field numbering continues after the two delimiter fields.
        global.product_id = hollerith(0, warnings);
        global.file_name = hollerith(1, warnings);
        // 2: native system id, 3: preprocessor version (ignored)
        // 4-8: integer/float precision parameters (ignored)
        // 9: receiving product id (ignored)
        global.model_scale = number(10, 1.0, warnings);
        global.units_flag = number(11, 2.0, warnings) as i64;
        global.units_name = hollerith(12, warnings);
        // 13: line weight gradations, 14: max line weight (ignored)
        // 15: timestamp (ignored on read)
        global.resolution = number(16, 1e-6, warnings);
        // 17: max coordinate (ignored)
        global.author = hollerith(18, warnings);
        global.organization = hollerith(19, warnings);

        global
    }
}

/// Parse one leading delimiter declaration (`1H,` form or empty).
fn take_delimiter_field<'a>(
    text: &'a str,
    global: &GlobalSection,
    warnings: &mut Warnings,
) -> (Option<char>, &'a str) {
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return (None, text);
    }
    // Empty field: the default delimiter stands.
    if bytes[0] == global.param_delim as u8 {
        return (None, &text[1..]);
    }
    if text.len() >= 3 && text.starts_with("1H") {
        let d = bytes[2] as char;
        // The declaration is itself terminated by the (possibly new) delimiter.
        let mut consumed = 3;
        if bytes.get(3) == Some(&(d as u8)) || bytes.get(3) == Some(&(global.param_delim as u8)) {
            consumed = 4;
        }
        return (Some(d), &text[consumed..]);
    }
    warnings.push("malformed delimiter declaration in global section".to_string());
    (None, text)
}

/// Split on the parameter delimiter, stopping at the record delimiter.
fn split_fields(text: &str, param_delim: char, record_delim: char) -> Vec<String> {
    let body = match text.find(record_delim) {
        Some(pos) => &text[..pos],
        None => text,
    };
    body.split(param_delim).map(|s| s.to_string()).collect()
}

/// Decode a Hollerith field (`nH<body>`), bounds-checking the count.
///
/// A count pointing past the end of the field is a recoverable problem:
/// one warning, and the remaining bytes are used as-is.
pub fn parse_hollerith(field: &str, warnings: &mut Warnings) -> String {
    let field = field.trim();
    if field.is_empty() {
        return String::new();
    }
    let Some(h_pos) = field.find(['H', 'h']) else {
        return field.to_string();
    };
    let Ok(count) = field[..h_pos].trim().parse::<usize>() else {
        return field.to_string();
    };
    let body = &field[h_pos + 1..];
    if count > body.len() {
        warnings.push(format!(
            "Hollerith count {count} exceeds remaining {} bytes",
            body.len()
        ));
        return body.to_string();
    }
    body[..count].to_string()
}

/// Lenient real parser: Fortran D exponents are normalized to E first.
pub fn parse_real(field: &str) -> Option<f64> {
    let normalized = field.trim().replace(['D', 'd'], "E");
    if normalized.is_empty() {
        return Some(0.0);
    }
    normalized.parse::<f64>().ok()
}

/// One directory entry: two 80-column lines of 8-wide fields.
#[derive(Debug, Clone, Default)]
pub struct DirectoryEntry {
    /// 1-based sequence number of the entry's first directory line.
    pub de_pointer: usize,
    /// Entity type code (110 = line, 126 = B-spline curve, ...).
    pub entity_type: i64,
    /// 1-based first line of this entity's parameter data.
    pub parameter_pointer: usize,
    /// Directory pointer of the transformation matrix entity, 0 for none.
    pub transform: usize,
    /// Status field: subordinate entity switch (01 = physically dependent).
    pub subordinate: i64,
    /// Color number; negative values point at a color definition entity.
    pub color: i64,
    /// Number of parameter lines.
    pub parameter_lines: usize,
    /// Form number.
    pub form: i64,
    /// Level (layer).
    pub level: i64,
}

/// Parse the directory section into entries (two lines each).
pub fn parse_directory(lines: &[String], warnings: &mut Warnings) -> Vec<DirectoryEntry> {
    let mut entries = Vec::with_capacity(lines.len() / 2);
    let mut i = 0;
    while i + 1 < lines.len() {
        let line1 = &lines[i];
        let line2 = &lines[i + 1];
        let field = |line: &str, n: usize| -> i64 {
            let start = n * 8;
            line.get(start..start + 8)
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .and_then(|f| f.parse::<i64>().ok())
                .unwrap_or(0)
        };
        let status = |line: &str| -> i64 {
            // Status (columns 65-72) holds four 2-digit subfields; the
            // second pair is the subordinate switch.
            line.get(64..72)
                .and_then(|f| f.get(2..4))
                .and_then(|f| f.trim().parse::<i64>().ok())
                .unwrap_or(0)
        };

        let entity_type = field(line1, 0);
        if entity_type == 0 {
            warnings.push(format!(
                "directory entry at line {} has no entity type, skipped",
                i + 1
            ));
            i += 2;
            continue;
        }
        entries.push(DirectoryEntry {
            de_pointer: i + 1,
            entity_type,
            parameter_pointer: field(line1, 1).max(0) as usize,
            transform: field(line1, 6).max(0) as usize,
            subordinate: status(line1),
            level: field(line1, 4),
            color: field(line2, 2),
            parameter_lines: field(line2, 3).max(0) as usize,
            form: field(line2, 4),
        });
        i += 2;
    }
    if lines.len() % 2 == 1 {
        warnings.push("odd number of directory lines, last entry ignored".to_string());
    }
    entries
}

/// Gather one entity's parameter fields from the parameter section.
///
/// Lines `parameter_pointer ..+ parameter_lines` are concatenated and
/// split on the parameter delimiter up to the record delimiter.
pub fn parameter_fields(
    entry: &DirectoryEntry,
    parameter_lines: &[String],
    global: &GlobalSection,
    warnings: &mut Warnings,
) -> Vec<String> {
    if entry.parameter_pointer == 0 {
        return Vec::new();
    }
    let start = entry.parameter_pointer - 1;
    let count = entry.parameter_lines.max(1);
    if start >= parameter_lines.len() {
        warnings.push(format!(
            "directory entry {}: parameter pointer {} out of range",
            entry.de_pointer, entry.parameter_pointer
        ));
        return Vec::new();
    }
    let end = (start + count).min(parameter_lines.len());
    let text: String = parameter_lines[start..end].join("");
    let mut fields = split_fields(&text, global.param_delim, global.record_delim);
    // First field repeats the entity type; drop it.
    if !fields.is_empty() {
        fields.remove(0);
    }
    fields
}

/// Parse a real field of an entity, warning and yielding zero on failure.
pub fn real_field(fields: &[String], idx: usize, warnings: &mut Warnings) -> f64 {
    match fields.get(idx).map(|f| f.trim()) {
        None | Some("") => 0.0,
        Some(f) => parse_real(f).unwrap_or_else(|| {
            warnings.push(format!("bad real '{f}' at parameter {idx}, using 0"));
            0.0
        }),
    }
}

/// Parse an integer field, warning and yielding zero on failure.
pub fn int_field(fields: &[String], idx: usize, warnings: &mut Warnings) -> i64 {
    match fields.get(idx).map(|f| f.trim()) {
        None | Some("") => 0,
        Some(f) => f.parse::<i64>().unwrap_or_else(|_| {
            // Tolerate reals written where integers belong.
            parse_real(f).map(|v| v as i64).unwrap_or_else(|| {
                warnings.push(format!("bad integer '{f}' at parameter {idx}, using 0"));
                0
            })
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sections() {
        let mut w = Warnings::new();
        let text = format!(
            "{:<72}S{:>7}\n{:<72}G{:>7}\n{:<72}D{:>7}\n{:<72}D{:>7}\n{:<64}{:>8}P{:>7}\n{:<72}T{:>7}\n",
            "hello", 1, "1H,,1H;,4Htest;", 1, "     110       1", 1, "", 2, "110,0.,0.,0.,1.,0.,0.;", 1, 1, "S1G1D2P1", 1
        );
        let s = split_sections(&text, &mut w).unwrap();
        assert_eq!(s.start.len(), 1);
        assert_eq!(s.global.len(), 1);
        assert_eq!(s.directory.len(), 2);
        assert_eq!(s.parameter.len(), 1);
        assert!(w.is_empty());
    }

    #[test]
    fn test_overlong_line_skipped() {
        let mut w = Warnings::new();
        let long = format!("{:<100}S{:>7}\n{:<72}G{:>7}\n", "x", 1, "1H,,1H;;", 1);
        let s = split_sections(&long, &mut w).unwrap();
        assert_eq!(s.start.len(), 0);
        assert_eq!(s.global.len(), 1);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_global_defaults_and_units() {
        let mut w = Warnings::new();
        let g = GlobalSection::parse(
            &["1H,,1H;,7Hproduct,8Hfile.igs,5Hdcad1,4Hpre1,32,38,6,308,15,7Hproduct,1.0,1,2HIN,1,0.08,13H240601.120000,1.0E-6,0.0,6Hauthor,3Horg,11,0;".to_string()],
            &mut w,
        );
        assert_eq!(g.param_delim, ',');
        assert_eq!(g.record_delim, ';');
        assert_eq!(g.product_id, "product");
        assert_eq!(g.file_name, "file.igs");
        assert_eq!(g.units_flag, 1);
        assert_eq!(g.author, "author");
        assert_eq!(g.organization, "org");
        assert_eq!(g.unit_scale(1.0, &mut w), 25.4);
        assert!(w.is_empty(), "{:?}", w.messages());
    }

    #[test]
    fn test_hollerith_bounds_check() {
        let mut w = Warnings::new();
        // Count 5 but only 4 payload bytes before the delimiter.
        let fields = split_fields("5Habcd,;", ',', ';');
        let value = parse_hollerith(&fields[0], &mut w);
        assert_eq!(value, "abcd");
        assert_eq!(w.len(), 1);
        assert!(w.messages()[0].contains("exceeds"));
    }

    #[test]
    fn test_hollerith_exact() {
        let mut w = Warnings::new();
        assert_eq!(parse_hollerith("4Habcd", &mut w), "abcd");
        assert_eq!(parse_hollerith("2HMM", &mut w), "MM");
        assert!(w.is_empty());
    }

    #[test]
    fn test_parse_real_d_exponent() {
        assert_eq!(parse_real("1.25D-3"), Some(1.25e-3));
        assert_eq!(parse_real("2.5"), Some(2.5));
        assert_eq!(parse_real(""), Some(0.0));
        assert_eq!(parse_real("junk"), None);
    }

    #[test]
    fn test_directory_entry_fields() {
        let mut w = Warnings::new();
        let line1 = format!(
            "{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}00010000",
            126, 1, 0, 0, 0, 0, 0, 0
        );
        let line2 = format!(
            "{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}",
            126, 0, -5, 3, 0, 0, 0, 0
        );
        let entries = parse_directory(&[line1, line2], &mut w);
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.entity_type, 126);
        assert_eq!(e.parameter_pointer, 1);
        assert_eq!(e.subordinate, 1);
        assert_eq!(e.color, -5);
        assert_eq!(e.parameter_lines, 3);
        assert_eq!(e.de_pointer, 1);
    }

    #[test]
    fn test_parameter_fields_drop_type() {
        let mut w = Warnings::new();
        let entry = DirectoryEntry {
            parameter_pointer: 1,
            parameter_lines: 1,
            ..Default::default()
        };
        let global = GlobalSection::default();
        let fields = parameter_fields(
            &entry,
            &["110,0.0,0.0,0.0,10.0,0.0,0.0;".to_string()],
            &global,
            &mut w,
        );
        assert_eq!(fields.len(), 6);
        assert_eq!(real_field(&fields, 3, &mut w), 10.0);
    }
}
