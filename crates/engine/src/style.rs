use serde::{Deserialize, Serialize};

/// Brand configuration supplied with a job. All fields optional; an empty
/// config still produces a usable (neutral) style vector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandConfig {
    #[serde(default)]
    pub colors: Vec<String>,
    pub logo_url: Option<String>,
    #[serde(default)]
    pub tone_keywords: Vec<String>,
    pub brand_name: Option<String>,
}

/// Bounded style fingerprint derived once per job from brand configuration.
/// The visual anchor text is reused verbatim across every scene prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleVector {
    pub brand_recognition: f64,
    pub color_harmony: f64,
    pub tone_alignment: f64,
    pub confidence: f64,
    pub visual_anchor: String,
}

impl StyleVector {
    /// Fallback vector used when brand signal is too weak to trust.
    pub fn neutral() -> Self {
        StyleVector {
            brand_recognition: 0.5,
            color_harmony: 0.5,
            tone_alignment: 0.5,
            confidence: 0.0,
            visual_anchor: "clean modern visual style, balanced composition, natural lighting"
                .to_string(),
        }
    }

    pub fn clamped(mut self) -> Self {
        self.brand_recognition = self.brand_recognition.clamp(0.0, 1.0);
        self.color_harmony = self.color_harmony.clamp(0.0, 1.0);
        self.tone_alignment = self.tone_alignment.clamp(0.0, 1.0);
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}
