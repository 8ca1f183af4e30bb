//! Extraction profiles: the instruction sent to the model plus the field
//! schema expected back.
//!
//! The pipeline itself never changes between document types. What changes is
//! the instruction and the columns of the resulting table, so both live in one
//! [`ExtractionProfile`] value chosen by the caller.
//!
//! Every built-in instruction ends with the same output contract: a single
//! JSON array of flat objects keyed by the profile's field names. The block
//! extractor in [`crate::pipeline::blocks`] depends on that contract and
//! nothing else.

use serde::{Deserialize, Serialize};

/// Column headers for the delivery-note profile.
pub const DELIVERY_NOTE_FIELDS: [&str; 4] = [
    "Référence produit / 产品参考",
    "Nom produit",
    "Quantité corrigée",
    "Commentaire",
];

/// Column headers for the stock-count profile.
pub const STOCK_COUNT_FIELDS: [&str; 5] = ["Couleur", "Palettes", "Cartons", "Pièces", "Total"];

const DELIVERY_NOTE_INSTRUCTION: &str = r#"You are reading a scanned delivery note that has been corrected by hand.
This is a visual task: read the attached image, not these instructions.

For every product line visible on the page:
1. Read the product reference and the product name.
2. Read the corrected quantity:
   - A struck-through value is no longer valid.
   - Use the value that is NOT struck through, or the handwritten replacement.
   - Never drop the line; only replace its quantity with the visible correction.
3. If the quantity was changed by hand, put "Corrigée manuellement" in "Commentaire".
4. If no change is visible, put "OK" in "Commentaire".
5. Skip only lines that are struck through entirely.

Return ONLY a JSON array, one object per product line, for example:
[
  {"Référence produit / 产品参考": "REF123", "Nom produit": "DIA COLOR 7.1", "Quantité corrigée": "60", "Commentaire": "Corrigée manuellement"},
  {"Référence produit / 产品参考": "REF456", "Nom produit": "MAJIREL 5.1", "Quantité corrigée": "108", "Commentaire": "OK"}
]
Do not write anything before or after the JSON array."#;

const STOCK_COUNT_INSTRUCTION: &str = r#"You are reading a handwritten stock-count sheet.
This is a visual task: read the attached image, not these instructions.

The sheet groups stock by color. For every color row visible on the page:
1. Read the color name or code.
2. Read the number of full pallets, full cartons, and loose pieces.
3. Read the total written on the sheet. If no total is written, leave it empty.
4. Use numbers for counts. Use an empty string when a cell is blank.

Return ONLY a JSON array, one object per color row, for example:
[
  {"Couleur": "5.1", "Palettes": 2, "Cartons": 14, "Pièces": 3, "Total": 1011}
]
Do not write anything before or after the JSON array."#;

/// Instruction text and expected field schema for one kind of document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionProfile {
    /// Short identifier used on the command line and in logs.
    pub name: String,
    /// Instruction text sent alongside each page image.
    pub instruction: String,
    /// Expected field names, in column order. May be empty, in which case
    /// columns follow the order the model first emits them.
    pub fields: Vec<String>,
    /// Worksheet name used by the exporter (max 31 characters).
    pub sheet_name: String,
    /// Suggested download file name.
    pub file_name: String,
}

impl ExtractionProfile {
    /// Hand-corrected delivery notes: product reference, name, corrected
    /// quantity, comment.
    pub fn delivery_note() -> Self {
        Self {
            name: "delivery-note".into(),
            instruction: DELIVERY_NOTE_INSTRUCTION.into(),
            fields: DELIVERY_NOTE_FIELDS.iter().map(|f| f.to_string()).collect(),
            sheet_name: "CORRECTIONS_USINE".into(),
            file_name: "corrections_usine.xlsx".into(),
        }
    }

    /// Handwritten stock tallies: color, pallets, cartons, pieces, total.
    pub fn stock_count() -> Self {
        Self {
            name: "stock-count".into(),
            instruction: STOCK_COUNT_INSTRUCTION.into(),
            fields: STOCK_COUNT_FIELDS.iter().map(|f| f.to_string()).collect(),
            sheet_name: "INVENTAIRE".into(),
            file_name: "inventaire.xlsx".into(),
        }
    }

    /// A caller-supplied instruction and field list.
    pub fn custom(instruction: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: "custom".into(),
            instruction: instruction.into(),
            fields,
            sheet_name: "EXTRACTION".into(),
            file_name: "extraction.xlsx".into(),
        }
    }

    /// Look up a built-in profile by its command-line name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "delivery-note" | "delivery" => Some(Self::delivery_note()),
            "stock-count" | "stock" => Some(Self::stock_count()),
            _ => None,
        }
    }
}

impl Default for ExtractionProfile {
    fn default() -> Self {
        Self::delivery_note()
    }
}
