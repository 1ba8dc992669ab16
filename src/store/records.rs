use serde::{Deserialize, Serialize};

use crate::pipeline::Decision;
use crate::scoring::{BodyScores, RaceScores};

/// One sampled image of a decided profile, awaiting human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub profile: String,
    pub image: String,
    #[serde(rename = "race_score", with = "score_vector")]
    pub race_scores: RaceScores,
    #[serde(rename = "obesity_score", with = "score_vector")]
    pub body_scores: BodyScores,
    #[serde(rename = "predicted_attractiveness")]
    pub interest_score: f32,
    #[serde(rename = "final_decision")]
    pub decision: Decision,
}

/// A human-confirmed outcome for one image.
///
/// The same layout backs both the review verdict table and the seed-label
/// table produced by manual labeling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub image: String,
    pub outcome: f32,
    #[serde(with = "score_vector")]
    pub race_scores: RaceScores,
    #[serde(rename = "obese_scores", with = "score_vector")]
    pub body_scores: BodyScores,
}

/// One candidate image of the seed dataset; outcomes come from labeling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedRecord {
    pub image: String,
    #[serde(with = "score_vector")]
    pub race_scores: RaceScores,
    #[serde(rename = "obese_scores", with = "score_vector")]
    pub body_scores: BodyScores,
}

/// Serializes fixed-size score vectors as `"[a, b, c]"` strings.
///
/// Parsing also accepts the space-separated form (`"[a b  c]"`) written by
/// older tooling.
pub mod score_vector {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn format<const N: usize>(values: &[f32; N]) -> String {
        let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        format!("[{}]", parts.join(", "))
    }

    pub fn parse<const N: usize>(text: &str) -> Result<[f32; N], String> {
        let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
        let values: Vec<f32> = inner
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<f32>().map_err(|e| format!("{:?}: {}", part, e)))
            .collect::<Result<_, _>>()?;
        if values.len() != N {
            return Err(format!("expected {} values, found {} in {:?}", N, values.len(), text));
        }
        let mut out = [0.0f32; N];
        out.copy_from_slice(&values);
        Ok(out)
    }

    pub fn serialize<S: Serializer, const N: usize>(
        values: &[f32; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(values))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[f32; N], D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(de::Error::custom)
    }
}
