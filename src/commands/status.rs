use anyhow::{bail, Result};

use crate::db::Database;
use crate::models::IssueStatus;

pub fn run(db: &Database, id: i64, status: &str) -> Result<()> {
    let status: IssueStatus = match status.parse() {
        Ok(s) => s,
        Err(e) => bail!(e),
    };

    match db.update_status(id, status)? {
        Some(issue) => println!("Issue #{} is now {}", issue.id, issue.status),
        None => bail!("Issue #{} not found", id),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, NewIssue};
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    fn create(db: &Database) -> i64 {
        db.create_issue(&NewIssue {
            description: "Detected a High urgency issue: Pothole.".to_string(),
            category: "Pothole".to_string(),
            urgency: "High".to_string(),
            location: Location { lat: 1.0, lng: 2.0 },
            image_url: "http://localhost:5000/uploads/p.jpg".to_string(),
            author: "user1".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_set_status() {
        let (db, _dir) = setup_test_db();
        let id = create(&db);

        run(&db, id, "in progress").unwrap();
        let issue = db.get_issue(id).unwrap().unwrap();
        assert_eq!(issue.status, IssueStatus::InProgress);
    }

    #[test]
    fn test_invalid_status() {
        let (db, _dir) = setup_test_db();
        let id = create(&db);

        let result = run(&db, id, "closed");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid status"));
        assert_eq!(db.get_issue(id).unwrap().unwrap().status, IssueStatus::Submitted);
    }

    #[test]
    fn test_missing_issue() {
        let (db, _dir) = setup_test_db();
        let result = run(&db, 99999, "Resolved");
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    proptest! {
        #[test]
        fn prop_unknown_status_rejected(
            status in "[a-z]{1,10}".prop_filter("Exclude valid statuses", |s| {
                !["submitted", "resolved", "rejected"].contains(&s.as_str())
            })
        ) {
            let (db, _dir) = setup_test_db();
            let id = create(&db);
            prop_assert!(run(&db, id, &status).is_err());
        }
    }
}
