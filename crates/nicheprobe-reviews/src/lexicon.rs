//! The closed defect lexicon, calibrated for the car phone mount niche.
//!
//! The set of defect types is an enum on purpose: free-form defect strings
//! never reach the store, and adding a type is a schema change plus a
//! version bump. Keywords are lowercase substrings matched against the
//! lowercased review body.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use nicheprobe_core::ParseDomainError;

/// One entry of the closed defect set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectType {
    MechanicalFailure,
    PoorGrip,
    Durability,
    CompatibilityIssue,
    HeatIssue,
    InstallationIssue,
    VibrationNoise,
    MaterialQuality,
    SizeFit,
}

impl DefectType {
    pub const ALL: [DefectType; 9] = [
        DefectType::MechanicalFailure,
        DefectType::PoorGrip,
        DefectType::Durability,
        DefectType::CompatibilityIssue,
        DefectType::HeatIssue,
        DefectType::InstallationIssue,
        DefectType::VibrationNoise,
        DefectType::MaterialQuality,
        DefectType::SizeFit,
    ];

    /// How critical this defect is for the purchase decision, in `[0, 1]`.
    #[must_use]
    pub fn base_weight(self) -> f64 {
        match self {
            Self::MechanicalFailure => 0.90,
            Self::PoorGrip => 0.85,
            Self::Durability => 0.75,
            Self::CompatibilityIssue => 0.70,
            Self::HeatIssue => 0.65,
            Self::InstallationIssue => 0.60,
            Self::VibrationNoise => 0.55,
            Self::MaterialQuality => 0.50,
            Self::SizeFit => 0.40,
        }
    }

    /// Lowercase substrings whose presence in a review body marks this
    /// defect. A single review may match several types.
    #[must_use]
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::MechanicalFailure => &[
                "broke",
                "broken",
                "snapped",
                "cracked",
                "fell apart",
                "stopped working",
                "collapsed",
                "shattered",
                "split",
            ],
            Self::PoorGrip => &[
                "slips",
                "slides",
                "falls off",
                "doesn't hold",
                "loose",
                "phone fell",
                "dropped my phone",
                "can't hold",
                "keeps falling",
                "doesn't stay",
                "won't grip",
                "no grip",
            ],
            Self::Durability => &[
                "after a month",
                "after a week",
                "few months later",
                "didn't last",
                "wore out",
                "degraded",
                "stopped sticking",
                "adhesive wore off",
                "suction lost over time",
            ],
            Self::CompatibilityIssue => &[
                "doesn't fit",
                "too small",
                "too big",
                "case too thick",
                "won't fit my phone",
                "not compatible",
                "blocks camera",
                "blocks buttons",
                "can't charge",
                "magsafe doesn't work",
                "doesn't work with case",
                "phone too heavy",
            ],
            Self::HeatIssue => &[
                "overheats",
                "gets hot",
                "phone heats up",
                "too hot",
                "blocks airflow",
                "heat damage",
            ],
            Self::InstallationIssue => &[
                "hard to install",
                "difficult to mount",
                "instructions",
                "confusing setup",
                "can't attach",
                "won't stick",
                "doesn't stick",
                "suction doesn't hold",
                "suction cup failed",
                "won't stay on windshield",
                "won't stay on dash",
            ],
            Self::VibrationNoise => &[
                "vibrates",
                "rattles",
                "shakes",
                "buzzes",
                "noisy",
                "wobbles",
                "jiggles",
                "unstable on bumps",
            ],
            Self::MaterialQuality => &[
                "cheap plastic",
                "feels flimsy",
                "low quality",
                "thin",
                "feels cheap",
                "poor quality",
                "plastic broke",
                "rubber peeled",
                "paint chipped",
                "creaks",
            ],
            Self::SizeFit => &[
                "too bulky",
                "blocks view",
                "obstructs",
                "takes too much space",
                "too large",
                "sticks out",
                "in the way",
            ],
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MechanicalFailure => "mechanical_failure",
            Self::PoorGrip => "poor_grip",
            Self::Durability => "durability",
            Self::CompatibilityIssue => "compatibility_issue",
            Self::HeatIssue => "heat_issue",
            Self::InstallationIssue => "installation_issue",
            Self::VibrationNoise => "vibration_noise",
            Self::MaterialQuality => "material_quality",
            Self::SizeFit => "size_fit",
        }
    }
}

impl FromStr for DefectType {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ParseDomainError {
                kind: "DefectType",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for DefectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_types_have_keywords_and_weights_in_range() {
        for defect in DefectType::ALL {
            assert!(!defect.keywords().is_empty(), "{defect} has no keywords");
            let w = defect.base_weight();
            assert!((0.0..=1.0).contains(&w), "{defect} weight out of range");
        }
    }

    #[test]
    fn weights_match_the_calibration() {
        assert!((DefectType::MechanicalFailure.base_weight() - 0.90).abs() < f64::EPSILON);
        assert!((DefectType::PoorGrip.base_weight() - 0.85).abs() < f64::EPSILON);
        assert!((DefectType::SizeFit.base_weight() - 0.40).abs() < f64::EPSILON);
    }

    #[test]
    fn string_forms_round_trip() {
        for defect in DefectType::ALL {
            assert_eq!(defect.as_str().parse::<DefectType>().unwrap(), defect);
        }
    }

    #[test]
    fn keywords_are_lowercase() {
        for defect in DefectType::ALL {
            for kw in defect.keywords() {
                assert_eq!(*kw, kw.to_lowercase(), "keyword not lowercase: {kw}");
            }
        }
    }
}
