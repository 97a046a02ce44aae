use psyche::{Expression, Face};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// [`Face`] that logs expression changes instead of drawing them.
///
/// Used until a display is attached; repeated expressions are not logged again.
#[derive(Default)]
pub struct LogFace {
    current: Mutex<Option<Expression>>,
}

impl LogFace {
    pub fn current(&self) -> Option<Expression> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Face for LogFace {
    fn show(&self, expression: &Expression) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref() == Some(expression) {
            return;
        }
        info!(face = expression.name(), "face changed");
        *current = Some(expression.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_latest_expression() {
        let face = LogFace::default();
        assert_eq!(face.current(), None);
        face.show(&Expression::from_mood("happy"));
        face.show(&Expression::Asleep);
        assert_eq!(face.current(), Some(Expression::Asleep));
    }
}
