use std::collections::HashSet;

use analysis_core::{PolaritySource, Symbol};
use async_trait::async_trait;

const POSITIVE_WORDS: &[&str] = &[
    "bullish", "rally", "surge", "gain", "profit", "growth", "beat",
    "upgrade", "outperform", "strong", "positive", "rise", "increase",
    "breakthrough", "innovation", "success", "exceed", "momentum",
    "buy", "recommend", "optimistic", "record", "high", "advance",
    // Financial-specific terms
    "dividend", "buyback", "repurchase", "accretive", "upside",
    "recovery", "rebound", "expansion", "robust", "accelerating",
    "overweight", "raised", "upgraded", "outpacing", "tailwind",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "decline", "loss", "fall", "plunge", "crash", "miss",
    "downgrade", "underperform", "weak", "negative", "drop", "decrease",
    "concern", "risk", "fail", "disappoint", "slump", "sell",
    "warning", "pessimistic", "low", "retreat", "fear", "trouble",
    // Financial-specific terms
    "dilution", "dilutive", "headwind", "lawsuit", "litigation",
    "recall", "investigation", "probe", "default", "bankruptcy",
    "restructuring", "layoff", "downside", "overvalued", "bubble",
    "underweight", "lowered", "suspended",
];

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "wouldn't", "couldn't", "shouldn't", "hardly",
    "barely", "neither", "nor", "without",
];

/// A sentiment word this many tokens after a negation is flipped.
const NEGATION_WINDOW: usize = 3;

/// Headline category, weighting how much a headline moves the aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
enum HeadlineKind {
    Earnings,
    MergersAcq,
    Regulatory,
    AnalystAction,
    Legal,
    General,
}

impl HeadlineKind {
    fn classify(text: &str) -> Self {
        let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

        if has(&["earnings", "quarterly", "guidance", "eps"]) {
            HeadlineKind::Earnings
        } else if has(&["acqui", "merger", "buyout", "takeover", "spinoff", "spin-off"]) {
            HeadlineKind::MergersAcq
        } else if has(&["fda", "sec ", "regulat", "approval", "antitrust"]) {
            HeadlineKind::Regulatory
        } else if has(&["upgrade", "downgrade", "price target", "analyst", "rating"]) {
            HeadlineKind::AnalystAction
        } else if has(&["lawsuit", "litigation", "settlement", "sued", "court"]) {
            HeadlineKind::Legal
        } else {
            HeadlineKind::General
        }
    }

    fn weight(&self) -> f64 {
        match self {
            HeadlineKind::Earnings => 2.0,
            HeadlineKind::MergersAcq => 2.5,
            HeadlineKind::Regulatory => 2.0,
            HeadlineKind::AnalystAction => 1.5,
            HeadlineKind::Legal => 1.5,
            HeadlineKind::General => 1.0,
        }
    }
}

/// Net sentiment of one text: (positive minus negative hits, total hits).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct TextScore {
    net: i32,
    hits: u32,
}

/// Word-list polarity over headlines with negation handling.
pub struct LexiconPolarity {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
    negation: HashSet<&'static str>,
}

impl LexiconPolarity {
    pub fn new() -> Self {
        Self {
            positive: POSITIVE_WORDS.iter().copied().collect(),
            negative: NEGATIVE_WORDS.iter().copied().collect(),
            negation: NEGATION_WORDS.iter().copied().collect(),
        }
    }

    fn score_text(&self, text_lower: &str) -> TextScore {
        let words: Vec<&str> = text_lower
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '.' | '!' | '?' | ':'))
            .filter(|w| !w.is_empty())
            .collect();

        let negations: Vec<usize> = words
            .iter()
            .enumerate()
            .filter(|(_, w)| self.negation.contains(*w))
            .map(|(i, _)| i)
            .collect();

        let mut score = TextScore::default();
        for (i, word) in words.iter().enumerate() {
            let direction = if self.positive.contains(*word) {
                1
            } else if self.negative.contains(*word) {
                -1
            } else {
                continue;
            };

            let negated = negations
                .iter()
                .any(|&neg| neg < i && i - neg <= NEGATION_WINDOW);
            score.net += if negated { -direction } else { direction };
            score.hits += 1;
        }
        score
    }

    /// Weighted polarity in [-1, 1] over all texts, `None` when no text
    /// contains a sentiment word.
    pub fn score(&self, texts: &[String]) -> Option<f64> {
        let mut weighted_net = 0.0;
        let mut weighted_hits = 0.0;

        for text in texts {
            let lower = text.to_lowercase();
            let weight = HeadlineKind::classify(&lower).weight();
            let score = self.score_text(&lower);
            weighted_net += weight * score.net as f64;
            weighted_hits += weight * score.hits as f64;
        }

        if weighted_hits == 0.0 {
            None
        } else {
            Some((weighted_net / weighted_hits).clamp(-1.0, 1.0))
        }
    }
}

impl Default for LexiconPolarity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolaritySource for LexiconPolarity {
    async fn polarity(&self, symbol: &Symbol, texts: &[String]) -> Option<f64> {
        let polarity = self.score(texts);
        tracing::debug!(
            "Lexicon polarity for {} over {} texts: {:?}",
            symbol,
            texts.len(),
            polarity
        );
        polarity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_counts_sentiment_words() {
        let lexicon = LexiconPolarity::new();
        assert_eq!(
            lexicon.score_text("shares surge on strong demand"),
            TextScore { net: 2, hits: 2 }
        );
        assert_eq!(
            lexicon.score_text("stock plunge deepens, outlook weak"),
            TextScore { net: -2, hits: 2 }
        );
    }

    #[test]
    fn test_negation_flips_within_window() {
        let lexicon = LexiconPolarity::new();
        assert_eq!(lexicon.score_text("results were not strong").net, -1);
        // Negation too far back to apply
        assert_eq!(
            lexicon.score_text("not that the team expected strong results").net,
            1
        );
        assert_eq!(lexicon.score_text("no recall expected").net, 1);
    }

    #[test]
    fn test_polarity_bounds_and_absence() {
        let lexicon = LexiconPolarity::new();
        assert_eq!(lexicon.score(&texts(&["Company holds annual meeting"])), None);
        assert_eq!(lexicon.score(&[]), None);
        assert_eq!(lexicon.score(&texts(&["Rally continues", "Strong gain"])), Some(1.0));
        assert_eq!(lexicon.score(&texts(&["Crash", "Weak quarter"])), Some(-1.0));
    }

    #[test]
    fn test_event_weighting() {
        let lexicon = LexiconPolarity::new();
        // Earnings headline (weight 2) outweighs a general one (weight 1)
        let polarity = lexicon
            .score(&texts(&["Quarterly earnings beat", "Shares drop"]))
            .unwrap();
        assert!((polarity - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_polarity_source_impl() {
        let source: &dyn PolaritySource = &LexiconPolarity::new();
        let symbol = Symbol::parse("EXMP").unwrap();
        let polarity = source
            .polarity(&symbol, &texts(&["Analyst upgrade lifts outlook"]))
            .await;
        assert_eq!(polarity, Some(1.0));
    }
}
