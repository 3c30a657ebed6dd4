#[cfg(test)]
mod tests {
    use crate::db::{
        get_completed_challenges, mark_challenge_completed, unmark_challenge_completed,
    };
    use crate::error::AppError;
    use crate::test::test_utils::create_standard_test_db;

    use rocket::tokio;

    #[tokio::test]
    async fn test_mark_is_idempotent() {
        let test_db = create_standard_test_db().await;
        let pool = &test_db.pool;
        let user_id = test_db.user_id("regular_user").unwrap();
        let challenge_id = test_db.challenge_id("Clean a dataset").unwrap();

        assert!(mark_challenge_completed(pool, user_id, challenge_id).await.unwrap());
        assert!(!mark_challenge_completed(pool, user_id, challenge_id).await.unwrap());

        assert_eq!(test_db.completion_count(user_id, challenge_id).await, 1);

        let completed = get_completed_challenges(pool, user_id).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, challenge_id);
    }

    #[tokio::test]
    async fn test_unmark_is_idempotent() {
        let test_db = create_standard_test_db().await;
        let pool = &test_db.pool;
        let user_id = test_db.user_id("regular_user").unwrap();
        let challenge_id = test_db.challenge_id("Clean a dataset").unwrap();

        mark_challenge_completed(pool, user_id, challenge_id)
            .await
            .unwrap();

        assert!(unmark_challenge_completed(pool, user_id, challenge_id).await.unwrap());
        assert!(!unmark_challenge_completed(pool, user_id, challenge_id).await.unwrap());

        assert_eq!(test_db.completion_count(user_id, challenge_id).await, 0);
        assert!(get_completed_challenges(pool, user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_challenge_is_not_found() {
        let test_db = create_standard_test_db().await;
        let pool = &test_db.pool;
        let user_id = test_db.user_id("regular_user").unwrap();

        assert!(matches!(
            mark_challenge_completed(pool, user_id, 999).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            unmark_challenge_completed(pool, user_id, 999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_listed_in_completion_order() {
        let test_db = create_standard_test_db().await;
        let pool = &test_db.pool;
        let user_id = test_db.user_id("regular_user").unwrap();
        let clean = test_db.challenge_id("Clean a dataset").unwrap();
        let train = test_db.challenge_id("Train a classifier").unwrap();
        assert!(clean < train);

        // Both land within the same second, so only insertion order separates them.
        mark_challenge_completed(pool, user_id, train).await.unwrap();
        mark_challenge_completed(pool, user_id, clean).await.unwrap();

        let ids: Vec<i64> = get_completed_challenges(pool, user_id)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![train, clean]);

        unmark_challenge_completed(pool, user_id, train).await.unwrap();
        mark_challenge_completed(pool, user_id, train).await.unwrap();

        let ids: Vec<i64> = get_completed_challenges(pool, user_id)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![clean, train]);
    }

    #[tokio::test]
    async fn test_completions_are_per_user() {
        let test_db = create_standard_test_db().await;
        let pool = &test_db.pool;
        let regular = test_db.user_id("regular_user").unwrap();
        let admin = test_db.user_id("admin_user").unwrap();
        let clean = test_db.challenge_id("Clean a dataset").unwrap();
        let train = test_db.challenge_id("Train a classifier").unwrap();

        mark_challenge_completed(pool, regular, clean).await.unwrap();
        mark_challenge_completed(pool, regular, train).await.unwrap();
        mark_challenge_completed(pool, admin, train).await.unwrap();

        let regular_done = get_completed_challenges(pool, regular).await.unwrap();
        let mut ids: Vec<i64> = regular_done.iter().map(|c| c.id).collect();
        ids.sort();
        assert_eq!(ids, vec![clean, train]);

        unmark_challenge_completed(pool, admin, train).await.unwrap();

        assert!(get_completed_challenges(pool, admin).await.unwrap().is_empty());
        assert_eq!(get_completed_challenges(pool, regular).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_user_delete_cascades_to_completions() {
        let test_db = create_standard_test_db().await;
        let pool = &test_db.pool;
        let user_id = test_db.user_id("regular_user").unwrap();
        let challenge_id = test_db.challenge_id("Train a classifier").unwrap();

        mark_challenge_completed(pool, user_id, challenge_id)
            .await
            .unwrap();

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(pool)
            .await
            .unwrap();

        assert_eq!(test_db.completion_count(user_id, challenge_id).await, 0);
    }
}
