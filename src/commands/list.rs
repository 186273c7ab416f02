use anyhow::Result;

use crate::db::Database;
use crate::models::Issue;

/// Prints the shared feed, most upvoted first.
pub fn run(db: &Database) -> Result<()> {
    let issues = db.list_issues()?;
    print_issues(&issues);
    Ok(())
}

pub fn run_by_author(db: &Database, author: &str) -> Result<()> {
    let issues = db.list_issues_by_author(author)?;
    if issues.is_empty() {
        println!("No issues reported by {}.", author);
        return Ok(());
    }
    print_issues(&issues);
    Ok(())
}

fn print_issues(issues: &[Issue]) {
    if issues.is_empty() {
        println!("No issues found.");
        return;
    }

    for issue in issues {
        println!("{}", format_row(issue));
    }
}

fn format_row(issue: &Issue) -> String {
    let status_display = format!("[{}]", issue.status);
    let date = issue.created_at.format("%Y-%m-%d");
    format!(
        "#{:<4} {:13} {:<24} {:6} +{:<3} -{:<3} {:<12} {}",
        issue.id,
        status_display,
        truncate(&issue.category, 24),
        issue.urgency,
        issue.votes.upvotes,
        issue.votes.downvotes,
        truncate(&issue.author, 12),
        date
    )
}

fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", truncated)
    }
}
