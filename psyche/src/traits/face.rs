/// What the on-screen face shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    Neutral,
    /// Eyes closed; shown once the robot is shutting down.
    Asleep,
    /// A mood named by the dialogue backend, e.g. `"happy"`.
    Mood(String),
}

impl Expression {
    /// Map a backend mood name; blank names fall back to neutral.
    pub fn from_mood(mood: &str) -> Self {
        match mood.trim() {
            "" | "neutral" => Expression::Neutral,
            "neutral_closed" => Expression::Asleep,
            other => Expression::Mood(other.to_string()),
        }
    }

    /// Name of the face asset for this expression.
    pub fn name(&self) -> &str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Asleep => "neutral_closed",
            Expression::Mood(mood) => mood,
        }
    }
}

/// Face display.
pub trait Face: Send + Sync {
    fn show(&self, expression: &Expression);
}

/// [`Face`] without a display.
#[derive(Clone, Default)]
pub struct NoFace;

impl Face for NoFace {
    fn show(&self, _expression: &Expression) {}
}
