use engine::style::{BrandConfig, StyleVector};

/// Contrast ratio below which two palette colors are flagged as clashing.
const LOW_CONTRAST_RATIO: f64 = 1.5;

const TONE_LEXICON: &[&str] = &[
    "bold",
    "calm",
    "edgy",
    "energetic",
    "friendly",
    "luxurious",
    "minimal",
    "modern",
    "playful",
    "professional",
    "trustworthy",
    "warm",
];

/// Style vector plus the conflicts found while deriving it. The vector is
/// computed once per job and read-only afterwards.
#[derive(Debug, Clone)]
pub struct StyleBuild {
    pub vector: StyleVector,
    pub conflicts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EnforcedPrompt {
    pub text: String,
    pub warnings: Vec<String>,
}

pub struct ConsistencyEngine {
    confidence_floor: f64,
}

impl ConsistencyEngine {
    pub fn new(confidence_floor: f64) -> Self {
        ConsistencyEngine { confidence_floor }
    }

    /// Derive the style fingerprint from brand configuration. Weak signal
    /// never fails the job: below the confidence floor the neutral vector is
    /// returned instead. Conflicts are surfaced, not fatal.
    pub fn build_style_vector(&self, brand: Option<&BrandConfig>) -> StyleBuild {
        let brand = match brand {
            Some(b) => b,
            None => {
                return StyleBuild {
                    vector: StyleVector::neutral(),
                    conflicts: Vec::new(),
                }
            }
        };

        let mut conflicts = Vec::new();
        let mut palette = Vec::new();
        for raw in &brand.colors {
            match parse_hex(raw) {
                Some(rgb) => palette.push((normalize_hex(raw), rgb)),
                None => conflicts.push(format!("unparseable brand color '{}' ignored", raw)),
            }
        }

        // Pairwise contrast scan; clashing pairs cost harmony but keep the
        // palette intact.
        let mut color_harmony: f64 = if palette.is_empty() { 0.5 } else { 0.9 };
        for i in 0..palette.len() {
            for j in (i + 1)..palette.len() {
                let ratio = contrast_ratio(palette[i].1, palette[j].1);
                if ratio < LOW_CONTRAST_RATIO {
                    conflicts.push(format!(
                        "low contrast between {} and {} (ratio {:.2})",
                        palette[i].0, palette[j].0, ratio
                    ));
                    color_harmony -= 0.2;
                }
            }
        }

        let tone_matches = brand
            .tone_keywords
            .iter()
            .filter(|k| TONE_LEXICON.contains(&k.to_lowercase().as_str()))
            .count();
        let tone_alignment = if brand.tone_keywords.is_empty() {
            0.5
        } else {
            0.4 + 0.6 * tone_matches as f64 / brand.tone_keywords.len() as f64
        };

        let mut brand_recognition: f64 = 0.2;
        if brand.logo_url.is_some() {
            brand_recognition += 0.4;
        }
        if brand.brand_name.is_some() {
            brand_recognition += 0.2;
        }
        if !palette.is_empty() {
            brand_recognition += 0.2;
        }

        let mut confidence = 0.0;
        if !palette.is_empty() {
            confidence += 0.4;
        }
        if tone_matches > 0 {
            confidence += 0.3;
        }
        if brand.logo_url.is_some() || brand.brand_name.is_some() {
            confidence += 0.3;
        }

        if confidence < self.confidence_floor {
            return StyleBuild {
                vector: StyleVector::neutral(),
                conflicts,
            };
        }

        let vector = StyleVector {
            brand_recognition,
            color_harmony,
            tone_alignment,
            confidence,
            visual_anchor: build_anchor(brand, &palette),
        }
        .clamped();

        StyleBuild { vector, conflicts }
    }

    /// Inject the stable anchor and color constraints into a micro-prompt.
    /// The anchor text is byte-identical across all scenes of a job; harmony
    /// guidance is appended only when the palette has detected conflicts.
    pub fn enforce(&self, micro_prompt: &str, build: &StyleBuild) -> EnforcedPrompt {
        let mut text = format!(
            "{} Visual anchor: {}.",
            micro_prompt.trim_end(),
            build.vector.visual_anchor
        );
        if !build.conflicts.is_empty() {
            text.push_str(
                " Favor accessible, high-contrast color pairings and keep the palette harmonious.",
            );
        }
        EnforcedPrompt {
            text,
            warnings: build.conflicts.clone(),
        }
    }
}

fn build_anchor(brand: &BrandConfig, palette: &[(String, (u8, u8, u8))]) -> String {
    let mut parts = Vec::new();
    if let Some(name) = &brand.brand_name {
        parts.push(format!("{} brand identity", name));
    }
    if !palette.is_empty() {
        let colors: Vec<&str> = palette.iter().map(|(hex, _)| hex.as_str()).collect();
        parts.push(format!("palette strictly {}", colors.join(", ")));
    }
    if brand.logo_url.is_some() {
        parts.push("logo visible in closing frame".to_string());
    }
    if !brand.tone_keywords.is_empty() {
        parts.push(format!("{} tone", brand.tone_keywords.join(", ")));
    }
    if parts.is_empty() {
        StyleVector::neutral().visual_anchor
    } else {
        parts.join("; ")
    }
}

fn parse_hex(raw: &str) -> Option<(u8, u8, u8)> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

fn normalize_hex(raw: &str) -> String {
    format!("#{}", raw.trim().trim_start_matches('#').to_lowercase())
}

fn channel_linear(c: u8) -> f64 {
    let c = c as f64 / 255.0;
    if c <= 0.03928 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn relative_luminance((r, g, b): (u8, u8, u8)) -> f64 {
    0.2126 * channel_linear(r) + 0.7152 * channel_linear(g) + 0.0722 * channel_linear(b)
}

/// WCAG contrast ratio, 1.0 (identical) to 21.0 (black on white).
fn contrast_ratio(a: (u8, u8, u8), b: (u8, u8, u8)) -> f64 {
    let la = relative_luminance(a);
    let lb = relative_luminance(b);
    let (lighter, darker) = if la > lb { (la, lb) } else { (lb, la) };
    (lighter + 0.05) / (darker + 0.05)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_brand() -> BrandConfig {
        BrandConfig {
            colors: vec!["#1A1A2E".to_string(), "#E94560".to_string()],
            logo_url: Some("https://cdn.example.com/logo.png".to_string()),
            tone_keywords: vec!["bold".to_string(), "modern".to_string()],
            brand_name: Some("Acme".to_string()),
        }
    }

    #[test]
    fn missing_brand_yields_neutral_vector() {
        let consistency = ConsistencyEngine::new(0.35);
        let build = consistency.build_style_vector(None);
        assert_eq!(build.vector.confidence, 0.0);
        assert!(build.conflicts.is_empty());
    }

    #[test]
    fn weak_signal_falls_back_instead_of_failing() {
        let consistency = ConsistencyEngine::new(0.35);
        let brand = BrandConfig {
            tone_keywords: vec!["zorp".to_string()],
            ..Default::default()
        };
        let build = consistency.build_style_vector(Some(&brand));
        // No recognized signal at all: neutral fallback, not an error.
        assert_eq!(build.vector.confidence, 0.0);
    }

    #[test]
    fn full_brand_scores_above_floor() {
        let consistency = ConsistencyEngine::new(0.35);
        let build = consistency.build_style_vector(Some(&full_brand()));
        assert!(build.vector.confidence >= 0.9);
        assert!(build.vector.brand_recognition > 0.9);
        assert!(build.vector.visual_anchor.contains("#1a1a2e"));
        assert!(build.vector.visual_anchor.contains("Acme"));
        assert!(build.conflicts.is_empty());
    }

    #[test]
    fn style_vector_is_deterministic() {
        let consistency = ConsistencyEngine::new(0.35);
        let brand = full_brand();
        let first = consistency.build_style_vector(Some(&brand));
        let second = consistency.build_style_vector(Some(&brand));
        assert_eq!(first.vector.visual_anchor, second.vector.visual_anchor);
        assert_eq!(first.vector.confidence, second.vector.confidence);
    }

    #[test]
    fn low_contrast_pair_is_flagged_not_blocking() {
        let consistency = ConsistencyEngine::new(0.35);
        let brand = BrandConfig {
            colors: vec!["#404040".to_string(), "#4a4a4a".to_string()],
            logo_url: Some("logo.png".to_string()),
            tone_keywords: vec!["bold".to_string()],
            brand_name: None,
        };
        let build = consistency.build_style_vector(Some(&brand));
        assert_eq!(build.conflicts.len(), 1);
        assert!(build.conflicts[0].contains("low contrast"));
        assert!(build.vector.color_harmony < 0.9);
    }

    #[test]
    fn unparseable_color_is_ignored_with_warning() {
        let consistency = ConsistencyEngine::new(0.35);
        let brand = BrandConfig {
            colors: vec!["not-a-color".to_string(), "#ffffff".to_string()],
            logo_url: Some("logo.png".to_string()),
            tone_keywords: vec!["minimal".to_string()],
            brand_name: None,
        };
        let build = consistency.build_style_vector(Some(&brand));
        assert!(build
            .conflicts
            .iter()
            .any(|c| c.contains("unparseable")));
        assert!(build.vector.visual_anchor.contains("#ffffff"));
    }

    #[test]
    fn enforce_injects_anchor_verbatim() {
        let consistency = ConsistencyEngine::new(0.35);
        let build = consistency.build_style_vector(Some(&full_brand()));
        let first = consistency.enforce("Scene 1: product reveal.", &build);
        let second = consistency.enforce("Scene 2: lifestyle shot.", &build);
        assert!(first.text.contains(&build.vector.visual_anchor));
        assert!(second.text.contains(&build.vector.visual_anchor));
        assert!(first.warnings.is_empty());
        assert!(!first.text.contains("high-contrast color pairings"));
    }

    #[test]
    fn enforce_appends_guidance_on_conflict() {
        let consistency = ConsistencyEngine::new(0.35);
        let brand = BrandConfig {
            colors: vec!["#404040".to_string(), "#4a4a4a".to_string()],
            logo_url: Some("logo.png".to_string()),
            tone_keywords: vec![],
            brand_name: None,
        };
        let build = consistency.build_style_vector(Some(&brand));
        let enforced = consistency.enforce("Scene 1.", &build);
        assert!(enforced.text.contains("high-contrast color pairings"));
        assert_eq!(enforced.warnings.len(), 1);
    }

    #[test]
    fn contrast_ratio_extremes() {
        let black_on_white = contrast_ratio((0, 0, 0), (255, 255, 255));
        assert!((black_on_white - 21.0).abs() < 0.1);
        let same = contrast_ratio((128, 128, 128), (128, 128, 128));
        assert!((same - 1.0).abs() < f64::EPSILON);
    }
}
