// Colored terminal output for prediction results.
//
// Used by the offline `absa predict` command; the HTTP API returns JSON.

use colored::{ColoredString, Colorize};

use crate::labels::Sentiment;
use crate::pipeline::models::ReviewResult;

use super::truncate_chars;

/// Display prediction results, one block per review.
pub fn display_results(results: &[ReviewResult]) {
    if results.is_empty() {
        println!("No reviews to analyze.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Predictions ({} reviews) ===", results.len()).bold()
    );

    for result in results {
        println!();
        println!(
            "  {} {}",
            format!("#{}", result.id).bold(),
            truncate_chars(&result.text, 100).dimmed()
        );

        if let Some(ref error) = result.error {
            println!("    {} {}", "error:".red().bold(), error);
            continue;
        }

        if result.topics.is_empty() {
            println!("    {}", "no topics above threshold".dimmed());
            continue;
        }

        for (topic, sentiment) in result.topics.iter().zip(&result.sentiments) {
            println!("    {:<30} {}", topic, colorize_sentiment(sentiment));
        }
    }

    println!();

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    let detected: usize = results.iter().map(|r| r.topics.len()).sum();
    println!("  Topics detected: {detected}");
    if failed > 0 {
        println!("  {} {} reviews failed", "!".bright_red(), failed);
    }
}

/// Color a sentiment label: red negative, yellow neutral, green positive.
pub fn colorize_sentiment(label: &str) -> ColoredString {
    if label == Sentiment::Negative.label() {
        label.red()
    } else if label == Sentiment::Positive.label() {
        label.green()
    } else if label == Sentiment::Neutral.label() {
        label.yellow()
    } else {
        label.normal()
    }
}
