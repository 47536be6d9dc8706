use serde::{Deserialize, Serialize};

/// Defines stimuli and their render data
pub trait Stimulus: Clone + Send + Sync + std::fmt::Debug {
    fn cache_id(&self) -> usize;
    fn label(&self) -> &'static str;
    /// Key that counts as a correct categorization of this stimulus
    fn correct_key(&self) -> ResponseKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Square,
    Circle,
}

impl Stimulus for Shape {
    fn cache_id(&self) -> usize {
        match self {
            Shape::Square => 0,
            Shape::Circle => 1,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Shape::Square => "square",
            Shape::Circle => "circle",
        }
    }

    fn correct_key(&self) -> ResponseKey {
        match self {
            Shape::Square => ResponseKey::Z,
            Shape::Circle => ResponseKey::M,
        }
    }
}

/// Keys the task listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKey {
    Z,
    M,
    Space,
    Escape,
    Enter,
    P,
    Left,
    Right,
}

impl ResponseKey {
    pub fn name(&self) -> &'static str {
        match self {
            ResponseKey::Z => "z",
            ResponseKey::M => "m",
            ResponseKey::Space => "space",
            ResponseKey::Escape => "escape",
            ResponseKey::Enter => "return",
            ResponseKey::P => "p",
            ResponseKey::Left => "left",
            ResponseKey::Right => "right",
        }
    }

    /// Keys accepted inside a trial's response window
    pub fn is_categorization(&self) -> bool {
        matches!(self, ResponseKey::Z | ResponseKey::M)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_keys() {
        assert_eq!(Shape::Square.correct_key(), ResponseKey::Z);
        assert_eq!(Shape::Circle.correct_key(), ResponseKey::M);
    }

    #[test]
    fn test_cache_ids_distinct() {
        assert_ne!(Shape::Square.cache_id(), Shape::Circle.cache_id());
    }

    #[test]
    fn test_categorization_keys() {
        assert!(ResponseKey::Z.is_categorization());
        assert!(ResponseKey::M.is_categorization());
        assert!(!ResponseKey::Space.is_categorization());
        assert!(!ResponseKey::Escape.is_categorization());
    }

    #[test]
    fn test_shape_serde() {
        assert_eq!(serde_json::to_string(&Shape::Circle).unwrap(), "\"circle\"");
        let s: Shape = serde_json::from_str("\"square\"").unwrap();
        assert_eq!(s, Shape::Square);
        assert_eq!(s.label(), "square");
    }
}
