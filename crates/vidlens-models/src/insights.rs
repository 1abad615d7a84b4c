//! Insights derived from stage outputs after aggregation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::analysis::{ObjectTimeline, SceneSegment};

const OUTDOOR_MARKERS: &[&str] = &["tree", "grass", "sky", "car", "road", "building"];
const INDOOR_MARKERS: &[&str] = &["couch", "bed", "table", "chair", "tv", "door"];

const PERSON_CLASS: &str = "person";

/// Coarse setting of the footage, guessed from detected classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Outdoor,
    Indoor,
    #[default]
    Unknown,
}

impl Environment {
    /// Classify from the set of detected class names. Ties are `Unknown`.
    pub fn classify<'a>(classes: impl IntoIterator<Item = &'a str>) -> Self {
        let (mut outdoor, mut indoor) = (0usize, 0usize);
        for class in classes {
            if OUTDOOR_MARKERS.contains(&class) {
                outdoor += 1;
            } else if INDOOR_MARKERS.contains(&class) {
                indoor += 1;
            }
        }

        match outdoor.cmp(&indoor) {
            std::cmp::Ordering::Greater => Environment::Outdoor,
            std::cmp::Ordering::Less => Environment::Indoor,
            std::cmp::Ordering::Equal => Environment::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Outdoor => "outdoor",
            Environment::Indoor => "indoor",
            Environment::Unknown => "unknown",
        }
    }
}

/// People estimate for one scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SceneInsight {
    pub scene_index: u32,
    pub people: u64,
}

/// Person events inside the scene's inclusive frame range, divided by the
/// scene's frame span (minimum 1).
pub fn people_in_scene(objects: &ObjectTimeline, scene: &SceneSegment) -> u64 {
    let Some(events) = objects.get(PERSON_CLASS) else {
        return 0;
    };

    let hits = events
        .iter()
        .filter(|e| e.frame >= scene.start_frame && e.frame <= scene.end_frame)
        .count() as u64;

    hits / scene.end_frame.saturating_sub(scene.start_frame).max(1)
}

/// Per-scene insights for every scene, in scene order.
pub fn scene_insights(scenes: &[SceneSegment], objects: &ObjectTimeline) -> Vec<SceneInsight> {
    scenes
        .iter()
        .map(|scene| SceneInsight {
            scene_index: scene.index,
            people: people_in_scene(objects, scene),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ObjectEvent;

    fn scene(index: u32, start_frame: u64, end_frame: u64) -> SceneSegment {
        SceneSegment {
            index,
            start_time: start_frame as f64 / 25.0,
            end_time: end_frame as f64 / 25.0,
            start_frame,
            end_frame,
        }
    }

    fn person_at(frame: u64) -> ObjectEvent {
        ObjectEvent {
            timestamp: frame as f64 / 25.0,
            confidence: 0.9,
            frame,
        }
    }

    #[test]
    fn test_environment_majority() {
        assert_eq!(Environment::classify(["car", "tree", "chair"]), Environment::Outdoor);
        assert_eq!(Environment::classify(["couch", "tv", "person"]), Environment::Indoor);
        assert_eq!(Environment::classify(["car", "bed"]), Environment::Unknown);
        assert_eq!(Environment::classify(std::iter::empty()), Environment::Unknown);
    }

    #[test]
    fn test_people_in_scene() {
        let mut objects = ObjectTimeline::new();
        assert_eq!(people_in_scene(&objects, &scene(0, 0, 2)), 0);

        objects.insert(
            PERSON_CLASS.to_string(),
            vec![person_at(0), person_at(1), person_at(1), person_at(2), person_at(50)],
        );
        // 4 hits over a span of 2 frames
        assert_eq!(people_in_scene(&objects, &scene(0, 0, 2)), 2);
        // Single-frame scene uses a divisor of 1
        assert_eq!(people_in_scene(&objects, &scene(1, 50, 50)), 1);
        assert_eq!(people_in_scene(&objects, &scene(2, 10, 40)), 0);
    }

    #[test]
    fn test_scene_insights_follow_scene_order() {
        let scenes = vec![scene(0, 0, 1), scene(1, 1, 100)];
        let mut objects = ObjectTimeline::new();
        objects.insert(PERSON_CLASS.to_string(), vec![person_at(0), person_at(1)]);

        let insights = scene_insights(&scenes, &objects);
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0], SceneInsight { scene_index: 0, people: 2 });
        assert_eq!(insights[1], SceneInsight { scene_index: 1, people: 0 });
    }
}
