use serde::{Deserialize, Serialize};

use super::domain::{present, Lead};

/// Points awarded for each lead field that is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub email: u8,
    pub phone: u8,
    pub country: u8,
    pub degree_level: u8,
    pub field_of_study: u8,
    pub message: u8,
    /// Minimum message length, in characters, before the message earns points.
    pub message_min_chars: usize,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            email: 20,
            phone: 20,
            country: 15,
            degree_level: 15,
            field_of_study: 15,
            message: 15,
            message_min_chars: 50,
        }
    }
}

/// Lower score bounds for the `hot` and `warm` tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub hot: u8,
    pub warm: u8,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self { hot: 75, warm: 50 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub tiers: TierThresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadTier {
    Cold,
    Warm,
    Hot,
}

impl LeadTier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
            Self::Hot => "hot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactor {
    Email,
    Phone,
    Country,
    DegreeLevel,
    FieldOfStudy,
    Message,
}

/// Points contributed by one field, kept so the score can be explained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: ScoreFactor,
    pub points: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadScore {
    pub score: u8,
    pub tier: LeadTier,
    pub components: Vec<ScoreComponent>,
}

/// Pure, total lead scorer. Missing or blank fields contribute nothing.
#[derive(Debug, Clone, Default)]
pub struct LeadScorer {
    config: ScoringConfig,
}

impl LeadScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, lead: &Lead) -> LeadScore {
        let weights = &self.config.weights;
        let message_qualifies = present(lead.message.as_deref())
            .map(|message| message.chars().count() >= weights.message_min_chars)
            .unwrap_or(false);

        let checks = [
            (ScoreFactor::Email, is_present(&lead.email), weights.email),
            (ScoreFactor::Phone, is_present(&lead.phone), weights.phone),
            (
                ScoreFactor::Country,
                is_present(&lead.country_of_interest),
                weights.country,
            ),
            (
                ScoreFactor::DegreeLevel,
                is_present(&lead.degree_level),
                weights.degree_level,
            ),
            (
                ScoreFactor::FieldOfStudy,
                is_present(&lead.field_of_study),
                weights.field_of_study,
            ),
            (ScoreFactor::Message, message_qualifies, weights.message),
        ];

        let components: Vec<ScoreComponent> = checks
            .into_iter()
            .filter(|(_, hit, _)| *hit)
            .map(|(factor, _, points)| ScoreComponent { factor, points })
            .collect();

        let total: u32 = components.iter().map(|c| u32::from(c.points)).sum();
        let score = total.min(100) as u8;

        LeadScore {
            score,
            tier: self.tier_for(score),
            components,
        }
    }

    pub fn tier_for(&self, score: u8) -> LeadTier {
        let tiers = &self.config.tiers;
        if score >= tiers.hot {
            LeadTier::Hot
        } else if score >= tiers.warm {
            LeadTier::Warm
        } else {
            LeadTier::Cold
        }
    }
}

fn is_present(value: &Option<String>) -> bool {
    present(value.as_deref()).is_some()
}
