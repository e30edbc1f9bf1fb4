//! Analysis configuration.
//!
//! The three recognised options mirror the command-line flags of the
//! resolver: `icall-analysis-type`, `max-type-layer` and `debug-mode`.
//! Configuration can be built in code with the `with_*` methods or read
//! from a JSON document with kebab-case keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default cap on the number of type layers consulted per call.
pub const DEFAULT_MAX_TYPE_LAYER: usize = 10;

/// Indirect-call resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisKind {
    /// Function-type signature matching only.
    Signature,
    /// Signature matching refined by multi-layer type confinement.
    #[serde(rename = "multilayer")]
    MultiLayer,
    /// Multi-layer analysis that also traces stored function pointers.
    DataflowEnhanced,
    /// Multi-layer analysis plus whole-pointer-flow for simple calls.
    #[default]
    PointerFlow,
}

impl AnalysisKind {
    /// All kinds, from least to most precise.
    pub const ALL: [AnalysisKind; 4] = [
        AnalysisKind::Signature,
        AnalysisKind::MultiLayer,
        AnalysisKind::DataflowEnhanced,
        AnalysisKind::PointerFlow,
    ];

    /// Name as accepted on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::Signature => "signature",
            AnalysisKind::MultiLayer => "multilayer",
            AnalysisKind::DataflowEnhanced => "dataflow-enhanced",
            AnalysisKind::PointerFlow => "pointer-flow",
        }
    }

    /// Returns true if the kind runs multi-layer type confinement.
    pub fn uses_type_layers(self) -> bool {
        !matches!(self, AnalysisKind::Signature)
    }

    /// Returns true if stored function pointers are traced back to their
    /// origins during confinement.
    pub fn uses_dataflow(self) -> bool {
        matches!(
            self,
            AnalysisKind::DataflowEnhanced | AnalysisKind::PointerFlow
        )
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AnalysisKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownAnalysisKind(s.to_string()))
    }
}

/// Options controlling a resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AnalysisConfig {
    /// Strategy used for non-virtual indirect calls.
    #[serde(rename = "icall-analysis-type")]
    pub kind: AnalysisKind,
    /// Maximum number of type layers consulted per indirect call.
    pub max_type_layer: usize,
    /// Emit per-call diagnostics.
    pub debug_mode: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            kind: AnalysisKind::default(),
            max_type_layer: DEFAULT_MAX_TYPE_LAYER,
            debug_mode: false,
        }
    }
}

impl AnalysisConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resolution strategy.
    pub fn with_kind(mut self, kind: AnalysisKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the type-layer limit.
    pub fn with_max_type_layer(mut self, layers: usize) -> Self {
        self.max_type_layer = layers;
        self
    }

    /// Enables or disables diagnostic output.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug_mode = debug;
        self
    }

    /// Checks option ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_type_layer == 0 {
            return Err(Error::InvalidLayerLimit(self.max_type_layer));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// Missing keys take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
