//! Script rendering by literal placeholder replacement. Values are inserted
//! verbatim; nothing is escaped.

use crate::error::ExecutionError;
use crate::model::{PreparedCad, TradeColor};
use crate::tables::{self, RefTagType};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const CLEAN_TEMPLATE: &str = "updating3.scr";
pub const INSERT_TEMPLATE: &str = "updating_insert.scr";
pub const COMBINE_TEMPLATE: &str = "combine_dwgs.scr";
pub const REFTAG_TEXT_TEMPLATE: &str = "edit-reftag-text.scr";

const EXPORT_BLOCK: &str = "-view sw regenall -exporttoautocad p .\ns -ACAD\n\n";

lazy_static::lazy_static! {
    static ref CHILD_LAYER: regex_lite::Regex = regex_lite::Regex::new(r"\d{6}_(.+)-Lev").unwrap();
}

/// Substitutions for the clean script.
pub fn clean_script(master: &str, color_remap: Option<&str>, file: &PreparedCad, block_suffix: u32) -> String {
    let color = match &file.trade.color {
        TradeColor::NoChange => String::new(),
        TradeColor::Color(c) => format!("color {} * ", c),
    };
    let mut text = master.replace("%CHANGECOLOR%", &color);

    if let Some(remap) = color_remap {
        text = text.replace(";%ARCH_SCRIPT%", remap);
    }

    if file.trade.elevation_source.shifts_geometry() && !file.level.is_zero() {
        let block_name = format!("{}-Insert-{}", file.level.name, block_suffix);
        text = text.replace(
            ";block",
            &format!("_.-block {} 0,0,0 ALL \n_.-insert {} 0,0,0 1 1 0", block_name, block_name),
        );
        text = text.replace(
            ";elevate",
            &format!("_.MOVE ALL  0,0,0 0,0,{}", file.level.shift_elevation()),
        );
    }

    if file.trade.export_cross_section {
        text = text.replace(";-exporttoautocad", EXPORT_BLOCK);
    } else {
        text.push_str("qsave\n");
    }
    text
}

pub fn insert_script(template: &str, abbreviation: &str, current: &Path, save_as: &Path) -> String {
    template
        .replace("%insertblock%", &format!("INSERT_{}", abbreviation))
        .replace("%FILENAME%", &format!("\"{}\"", current.display()))
        .replace("%REVIEWFILEPATH%", &format!("\"{}\"", save_as.display()))
}

pub fn reftag_script(template: &str, label: &str, level: &str, destination: &Path) -> String {
    template
        .replace("%TRADEABBREV%", label)
        .replace("%LEVEL%", level)
        .replace("%FILEPATH%", &destination.display().to_string())
}

/// Layer for a child drawing: the part between `NNNNNN_` and `-Lev` of its name.
pub fn child_layer_name(child: &Path) -> Option<String> {
    let stem = child.file_stem()?.to_string_lossy();
    CHILD_LAYER
        .captures(&stem)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// One layer and one insert per child, in the given order.
pub fn combine_script(template: &str, children: &[PathBuf], combined: &Path) -> String {
    let mut layers_and_inserts = String::new();
    for child in children {
        let layer = child_layer_name(child).unwrap_or_else(|| {
            let fallback = child
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            warn!(
                "Could not parse subtrade for {}, falling back to basename.",
                child.display()
            );
            fallback
        });
        layers_and_inserts.push_str(&format!("-LAYER MAKE \"{}\"\n\n", layer));
        layers_and_inserts.push_str(&format!("-insert \"{}\"\n0,0,0\n\n\n\n", child.display()));
    }

    template
        .replace("%LAYERSANDINSERTS%", layers_and_inserts.trim_end_matches('\n'))
        .replace("%COMBINEDFILEPATH%", &format!("\"{}\"", combined.display()))
}

/// Label for a tag built from the default template: the name of the tag file up to `-Lev`.
pub fn default_reftag_label(reftag: &Path) -> String {
    let name = reftag
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind("-Lev") {
        Some(end) => name[..end].to_string(),
        None => name,
    }
}

/// Location of the shared script templates.
#[derive(Debug, Clone)]
pub struct ScriptTemplates {
    pub scripts_dir: PathBuf,
    pub reftag_dir: PathBuf,
}

impl ScriptTemplates {
    pub fn new(scripts_dir: impl Into<PathBuf>, reftag_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            reftag_dir: reftag_dir.into(),
        }
    }

    fn read(path: &Path) -> Result<String, ExecutionError> {
        fs::read_to_string(path).map_err(|source| ExecutionError::Template {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn reftag_template(&self, kind: RefTagType) -> PathBuf {
        self.reftag_dir.join(kind.template_file_name())
    }

    pub fn render_reftag(&self, label: &str, level: &str, destination: &Path) -> Result<String, ExecutionError> {
        let template = Self::read(&self.reftag_dir.join(REFTAG_TEXT_TEMPLATE))?;
        Ok(reftag_script(&template, label, level, destination))
    }

    pub fn render_clean(&self, file: &PreparedCad, block_suffix: u32) -> Result<String, ExecutionError> {
        let master = Self::read(&self.scripts_dir.join(CLEAN_TEMPLATE))?;
        let remap = match tables::color_remap_script(&file.trade.abbreviation) {
            Some(name) => Some(Self::read(&self.scripts_dir.join(name))?),
            None => None,
        };
        Ok(clean_script(&master, remap.as_deref(), file, block_suffix))
    }

    pub fn render_insert(&self, abbreviation: &str, current: &Path, save_as: &Path) -> Result<String, ExecutionError> {
        let template = Self::read(&self.scripts_dir.join(INSERT_TEMPLATE))?;
        Ok(insert_script(&template, abbreviation, current, save_as))
    }

    pub fn render_combine(&self, children: &[PathBuf], combined: &Path) -> Result<String, ExecutionError> {
        let template = Self::read(&self.scripts_dir.join(COMBINE_TEMPLATE))?;
        Ok(combine_script(&template, children, combined))
    }
}
