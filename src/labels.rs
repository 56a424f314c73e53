// Label space: the fixed topics and sentiment classes the head was trained on.
//
// Topic order defines the row layout of the score grid, so it must match the
// order used at training time. Never reorder these.

/// Review topics, in the order the classification head emits them.
pub const TOPICS: [&str; 11] = [
    "Вклады",
    "Кредиты наличными",
    "Мобильное приложение",
    "Дистанционное обслуживание",
    "Обслуживание",
    "Кредитные карты",
    "Дебетовые карты",
    "Кешбэк",
    "Ипотека",
    "Накопительный счет",
    "Сайт",
];

pub const NUM_TOPICS: usize = TOPICS.len();
pub const NUM_SENTIMENTS: usize = 3;

/// Number of raw scores the head produces per review.
pub const NUM_OUTPUTS: usize = NUM_TOPICS * NUM_SENTIMENTS;

/// Sentiment class, indexed the way the head's last axis is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    pub const ALL: [Sentiment; NUM_SENTIMENTS] =
        [Sentiment::Negative, Sentiment::Neutral, Sentiment::Positive];

    /// Map a class index from the score grid to a sentiment.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            Sentiment::Negative => 0,
            Sentiment::Neutral => 1,
            Sentiment::Positive => 2,
        }
    }

    /// The label returned to API clients.
    pub fn label(self) -> &'static str {
        match self {
            Sentiment::Negative => "Отрицательно",
            Sentiment::Neutral => "Нейтрально",
            Sentiment::Positive => "Положительно",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// All sentiment labels in class-index order.
pub fn sentiment_labels() -> Vec<&'static str> {
    Sentiment::ALL.iter().map(|s| s.label()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_count() {
        assert_eq!(NUM_TOPICS, 11);
        assert_eq!(NUM_OUTPUTS, 33);
    }

    #[test]
    fn test_sentiment_index_roundtrip() {
        for (i, s) in Sentiment::ALL.iter().enumerate() {
            assert_eq!(s.index(), i);
            assert_eq!(Sentiment::from_index(i), Some(*s));
        }
        assert_eq!(Sentiment::from_index(3), None);
    }

    #[test]
    fn test_sentiment_labels_in_index_order() {
        assert_eq!(
            sentiment_labels(),
            vec!["Отрицательно", "Нейтрально", "Положительно"]
        );
    }

    #[test]
    fn test_topics_are_unique() {
        let unique: std::collections::HashSet<_> = TOPICS.iter().collect();
        assert_eq!(unique.len(), TOPICS.len());
    }
}
