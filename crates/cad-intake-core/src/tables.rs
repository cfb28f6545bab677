//! Abbreviation-keyed lookup tables. These are part of the observable contract
//! (folder names, reftag templates, elevation column choice) and are built once.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefTagType {
    Default,
    A3d,
    Af,
    Ar,
    El,
    Fp,
    Hd,
    Hp,
    Pl,
    Stc,
    Ste,
}

impl RefTagType {
    /// Label written into the tag drawing.
    pub fn label(&self) -> &'static str {
        match self {
            RefTagType::Default => "",
            RefTagType::A3d => "A3D",
            RefTagType::Af => "AF",
            RefTagType::Ar => "AR",
            RefTagType::El => "EL",
            RefTagType::Fp => "FP",
            RefTagType::Hd => "HD",
            RefTagType::Hp => "HP",
            RefTagType::Pl => "PL",
            RefTagType::Stc => "STC",
            RefTagType::Ste => "STE",
        }
    }

    pub fn template_file_name(&self) -> String {
        match self {
            RefTagType::Default => "Reftag_Default.dwg".to_string(),
            other => format!("Reftag_{}.dwg", other.label()),
        }
    }
}

pub const ARCH_GROUP: &str = "ARCH";
pub const STRUCTURAL_GROUP: &str = "STRC";

lazy_static::lazy_static! {
    static ref REFTAG_TYPES: HashMap<&'static str, RefTagType> = {
        let mut m = HashMap::new();
        m.insert("A3D", RefTagType::A3d);
        m.insert("AF", RefTagType::Af);
        m.insert("AR", RefTagType::Ar);
        m.insert("EL", RefTagType::El);
        m.insert("ES", RefTagType::El);
        m.insert("FP", RefTagType::Fp);
        m.insert("FS", RefTagType::Fp);
        m.insert("HD", RefTagType::Hd);
        m.insert("HO", RefTagType::Hd);
        m.insert("HP", RefTagType::Hp);
        m.insert("HS", RefTagType::Hp);
        m.insert("PL", RefTagType::Pl);
        m.insert("PS", RefTagType::Pl);
        m.insert("STC", RefTagType::Stc);
        m.insert("STC(2D)", RefTagType::Stc);
        m.insert("STE", RefTagType::Ste);
        m.insert("STE(2D)", RefTagType::Ste);
        m
    };

    static ref ARCH_TRADES: Vec<&'static str> = vec!["AF", "AR", "A3D"];

    static ref STRUCTURAL_TRADES: Vec<&'static str> = vec!["STC", "STC(2D)", "STE", "STE(2D)"];

    /// Color remap blocks spliced into the clean script, matched case-sensitively.
    static ref COLOR_REMAP_SCRIPTS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("A3D", "A3D_CHANGE_COLORS.scr");
        m.insert("AF", "AF_CHANGE_COLORS.scr");
        m.insert("AR", "AR_CHANGE_COLORS.scr");
        m
    };
}

/// `None` means the default template applies.
pub fn reftag_type(abbreviation: &str) -> Option<RefTagType> {
    REFTAG_TYPES
        .get(abbreviation.to_ascii_uppercase().as_str())
        .copied()
}

pub fn is_structural(abbreviation: &str) -> bool {
    STRUCTURAL_TRADES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(abbreviation))
}

pub fn is_architectural(abbreviation: &str) -> bool {
    ARCH_TRADES.iter().any(|t| t.eq_ignore_ascii_case(abbreviation))
}

/// Inbox folder that a trade's batches are grouped under.
pub fn group_token(abbreviation: &str) -> String {
    if is_architectural(abbreviation) {
        ARCH_GROUP.to_string()
    } else if is_structural(abbreviation) {
        STRUCTURAL_GROUP.to_string()
    } else {
        abbreviation.to_string()
    }
}

pub fn color_remap_script(abbreviation: &str) -> Option<&'static str> {
    COLOR_REMAP_SCRIPTS.get(abbreviation).copied()
}
