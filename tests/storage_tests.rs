use portal_gateway::storage::{MockStorageService, S3StorageClient, StorageError, StorageService, sanitize_key};

#[cfg(test)]
mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_round_trip() {
        let mock = MockStorageService::new();

        mock.upload("owner/a.png", b"png".to_vec(), "image/png")
            .await
            .unwrap();

        let (bytes, content_type) = mock.download("owner/a.png").await.unwrap();
        assert_eq!(bytes, b"png");
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockStorageService::new_failing();

        let result = mock.upload("owner/a.png", vec![1], "image/png").await;
        assert!(matches!(result, Err(StorageError::Backend(_))));
        assert!(mock.remove(&["owner/a.png".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let mock = MockStorageService::new();
        let result = mock.download("owner/none.png").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_is_one_level_under_the_prefix() {
        let mock = MockStorageService::new();
        mock.put("alice/a.png", b"1", "image/png");
        mock.put("alice/b.pdf", b"22", "application/pdf");
        mock.put("alice/nested/c.png", b"3", "image/png");
        mock.put("bob/d.png", b"4", "image/png");

        let listed = mock.list("alice").await.unwrap();

        let names: Vec<&str> = listed.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.pdf"]);
        assert_eq!(listed[1].size, 2);
        assert_eq!(listed[0].url, "http://localhost:9000/mock-bucket/alice/a.png");
        assert!(listed[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_mock_sanitization() {
        let mock = MockStorageService::new();
        mock.upload("../../etc/passwd", b"x".to_vec(), "text/plain")
            .await
            .unwrap();

        assert_eq!(mock.paths(), vec!["etc/passwd"]);
    }
}

#[cfg(test)]
mod url_tests {
    use super::*;

    #[test]
    fn test_sanitize_key_drops_relative_segments() {
        assert_eq!(sanitize_key("a/../b/./c//d"), "a/b/c/d");
        assert_eq!(sanitize_key("/leading/slash"), "leading/slash");
        assert_eq!(sanitize_key(".."), "");
    }

    #[test]
    fn test_public_url_round_trip() {
        let mock = MockStorageService::new();
        let url = mock.public_url("owner/file.png");

        assert_eq!(url, "http://localhost:9000/mock-bucket/owner/file.png");
        assert_eq!(mock.path_from_public_url(&url).as_deref(), Some("owner/file.png"));
        assert_eq!(
            mock.path_from_public_url(&format!("{url}?download=1")).as_deref(),
            Some("owner/file.png")
        );
    }

    #[test]
    fn test_foreign_urls_have_no_path() {
        let mock = MockStorageService::new();

        assert_eq!(mock.path_from_public_url("https://cdn.example.com/x.png"), None);
        assert_eq!(
            mock.path_from_public_url("http://localhost:9000/mock-bucket/"),
            None
        );
    }
}

#[cfg(test)]
mod s3_tests {
    use super::*;

    #[tokio::test]
    async fn test_s3_client_public_urls() {
        let client = S3StorageClient::new(
            "http://localhost:9000",
            "us-east-1",
            "testkey",
            "testsecret",
            "uploads",
            "http://localhost:9000/",
        );

        assert_eq!(client.public_prefix(), "http://localhost:9000/uploads");
        assert_eq!(
            client.public_url("owner/report.pdf"),
            "http://localhost:9000/uploads/owner/report.pdf"
        );
    }
}
