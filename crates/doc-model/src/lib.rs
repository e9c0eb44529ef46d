use serde::{Deserialize, Serialize};

/// A rectangle to highlight, in document units.
///
/// `bbox` is `[x0, y0, x1, y1]` on the unrotated page with the origin at the
/// top-left corner and y growing downwards. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationBox {
    pub page: u32,
    pub bbox: [f64; 4],
    #[serde(default)]
    pub label: String,
}

impl AnnotationBox {
    pub fn new(page: u32, bbox: [f64; 4], label: impl Into<String>) -> Self {
        Self { page, bbox, label: label.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid analysis report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ANOMALIES")]
    Anomalies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyCode {
    /// Missing critical fields.
    E1,
    /// Arithmetic inconsistency.
    E2,
    /// Negative or incoherent totals.
    E3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnomalySeverity {
    High,
    Medium,
    Low,
}

/// Where in the document a finding was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextReference {
    pub page: i64,
    pub text_snippet: String,
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
}

impl TextReference {
    /// The reference as a highlight box, if it has a usable page and bbox.
    pub fn to_annotation(&self, label: &str) -> Option<AnnotationBox> {
        let page = u32::try_from(self.page).ok().filter(|page| *page >= 1)?;
        let bbox: [f64; 4] = self.bbox.as_deref()?.try_into().ok()?;

        Some(AnnotationBox::new(page, bbox, label))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub code: AnomalyCode,
    pub title: String,
    pub severity: AnomalySeverity,
    pub explanation: String,
    #[serde(default)]
    pub references: Vec<TextReference>,
}

impl Anomaly {
    pub fn highlights(&self) -> Vec<AnnotationBox> {
        self.references.iter().filter_map(|reference| reference.to_annotation(&self.title)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedField {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub references: Vec<TextReference>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PayslipData {
    #[serde(default)]
    pub net_a_payer: Option<ExtractedField>,
    #[serde(default)]
    pub salaire_brut: Option<ExtractedField>,
    #[serde(default)]
    pub total_cotisations: Option<ExtractedField>,
    #[serde(default)]
    pub prelevement_source: Option<ExtractedField>,
    #[serde(default)]
    pub net_imposable: Option<ExtractedField>,
    #[serde(default)]
    pub allegements: Option<ExtractedField>,
    #[serde(default)]
    pub periode: Option<ExtractedField>,
}

impl PayslipData {
    /// Fields in payslip reading order, with their wire names.
    pub fn fields(&self) -> [(&'static str, Option<&ExtractedField>); 7] {
        [
            ("net_a_payer", self.net_a_payer.as_ref()),
            ("salaire_brut", self.salaire_brut.as_ref()),
            ("total_cotisations", self.total_cotisations.as_ref()),
            ("prelevement_source", self.prelevement_source.as_ref()),
            ("net_imposable", self.net_imposable.as_ref()),
            ("allegements", self.allegements.as_ref()),
            ("periode", self.periode.as_ref()),
        ]
    }
}

/// Result of the payslip analysis step, as returned by its HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub status: AnalysisStatus,
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
    #[serde(default)]
    pub extracted_data: PayslipData,
}

impl AnalysisReport {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Highlights for the selected anomaly; the first one when nothing is
    /// selected. An out-of-range selection highlights nothing.
    pub fn selected_highlights(&self, selected: Option<usize>) -> Vec<AnnotationBox> {
        self.anomalies
            .get(selected.unwrap_or(0))
            .map(Anomaly::highlights)
            .unwrap_or_default()
    }

    /// Highlights for every anomaly, in report order.
    pub fn all_highlights(&self) -> Vec<AnnotationBox> {
        self.anomalies.iter().flat_map(Anomaly::highlights).collect()
    }
}
