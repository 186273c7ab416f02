use anyhow::{bail, Result};

use crate::db::Database;

pub fn run(db: &Database, id: i64) -> Result<()> {
    let issue = match db.get_issue(id)? {
        Some(i) => i,
        None => bail!("Issue #{} not found", id),
    };

    println!("Issue #{}: {}", issue.id, issue.category);
    println!("Status: {}", issue.status);
    println!("Urgency: {}", issue.urgency);
    println!("Reported by: {}", issue.author);
    println!("Location: {:.5}, {:.5}", issue.location.lat, issue.location.lng);
    println!("Image: {}", issue.image_url);
    println!("Created: {}", issue.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", issue.updated_at.format("%Y-%m-%d %H:%M:%S"));

    if !issue.description.is_empty() {
        println!("\nDescription:");
        for line in issue.description.lines() {
            println!("  {}", line);
        }
    }

    println!();
    println!("Upvotes: {}", issue.votes.upvotes);
    if !issue.votes.upvoted_by.is_empty() {
        let voters: Vec<&str> = issue.votes.upvoted_by.iter().map(String::as_str).collect();
        println!("  by {}", voters.join(", "));
    }
    println!("Downvotes: {}", issue.votes.downvotes);
    if !issue.votes.downvoted_by.is_empty() {
        let voters: Vec<&str> = issue.votes.downvoted_by.iter().map(String::as_str).collect();
        println!("  by {}", voters.join(", "));
    }

    Ok(())
}
