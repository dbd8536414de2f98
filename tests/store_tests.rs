//! Durable job store tests.


use relmon_service::error::RelmonError;
use relmon_service::relmon::{Intent, IntentKind, JobStatus};
use relmon_service::store::{Created, FileStore, JobStore};
use test_harness::{sample_job, user};

#[tokio::test]
async fn test_jobs_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("jobs.json");

    let mut job = sample_job("durable");
    job.status = JobStatus::Running;
    job.condor_id = 801341;
    job.rotate_secret();
    job.pending_intent = Some(Intent::new(IntentKind::Reset, Some(user("bob"))));

    let stored = {
        let store = FileStore::open(&path).await.unwrap();
        match store.create(job).await.unwrap() {
            Created::Inserted(job) => job,
            Created::AlreadyExists => panic!("job already existed"),
        }
    };

    let reopened = FileStore::open(&path).await.unwrap();
    let loaded = reopened.get(&stored.id).await.unwrap().unwrap();
    assert_eq!(loaded, stored);

    let pending = reopened.query_by_intent(IntentKind::Reset).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].pending_intent.as_ref().unwrap().requested_by,
        Some(user("bob"))
    );
    assert!(!path.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn test_replace_and_delete_are_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");

    let store = FileStore::open(&path).await.unwrap();
    let Created::Inserted(first) = store.create(sample_job("first")).await.unwrap() else {
        panic!("job already existed");
    };
    let Created::Inserted(mut second) = store.create(sample_job("second")).await.unwrap() else {
        panic!("job already existed");
    };

    second.status = JobStatus::Done;
    store.replace(second.clone()).await.unwrap();
    assert!(store.delete(&first.id).await.unwrap());
    assert!(!store.delete(&first.id).await.unwrap());

    let reopened = FileStore::open(&path).await.unwrap();
    let all = reopened.all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, second.id);
    assert_eq!(all[0].status, JobStatus::Done);
}

#[tokio::test]
async fn test_missing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("absent.json")).await.unwrap();

    assert!(store.all().await.unwrap().is_empty());
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let result = FileStore::open(&path).await;

    assert!(matches!(result, Err(RelmonError::Serialization(_))));
}

#[tokio::test]
async fn test_failed_write_is_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    let store = FileStore::open(&path).await.unwrap();
    let Created::Inserted(job) = store.create(sample_job("kept")).await.unwrap() else {
        panic!("job already existed");
    };

    // The temporary file cannot be written while a directory occupies its name
    std::fs::create_dir(path.with_extension("json.tmp")).unwrap();

    let mut changed = job.clone();
    changed.status = JobStatus::Failed;
    assert!(store.replace(changed).await.is_err());
    assert!(store.create(sample_job("lost")).await.is_err());
    assert!(store.delete(&job.id).await.is_err());

    let all = store.all().await.unwrap();
    assert_eq!(all, vec![job]);
}

#[tokio::test]
async fn test_replace_of_deleted_job_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("jobs.json")).await.unwrap();

    let result = store.replace(sample_job("ghost")).await;

    assert!(matches!(result, Err(RelmonError::JobNotFound(_))));
}

#[tokio::test]
async fn test_create_rejects_taken_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    let store = FileStore::open(&path).await.unwrap();
    store.create(sample_job("nightly")).await.unwrap();

    let duplicate = store.create(sample_job("nightly")).await.unwrap();

    assert_eq!(duplicate, Created::AlreadyExists);
    let reopened = FileStore::open(&path).await.unwrap();
    assert_eq!(reopened.all().await.unwrap().len(), 1);
}
