use crate::db::{new_record_id, Repository};
use crate::error::{AppError, Result};
use crate::models::{
    Essay, EssayDetail, EssayPatch, EssaySummary, NewEssay, RecordInput, RecordPatch, TtsCallback,
};
use crate::storage::FileStore;
use crate::tasks::{TaskKind, TaskPool};

use super::providers::Providers;

/// Collection name used for file storage paths and URLs.
pub const COLLECTION: &str = "essay";

const MAX_SAVE_ATTEMPTS: usize = 3;
const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 200;

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("essay {id}"))
}

#[derive(Clone)]
pub struct EssayService {
    repo: Repository,
    files: FileStore,
    providers: Providers,
    tasks: TaskPool,
}

impl EssayService {
    pub fn new(repo: Repository, files: FileStore, providers: Providers, tasks: TaskPool) -> Self {
        Self {
            repo,
            files,
            providers,
            tasks,
        }
    }

    pub fn tasks(&self) -> &TaskPool {
        &self.tasks
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Creates an essay with a generated thumbnail, then queues mirror
    /// publishing and speech synthesis without waiting for either.
    pub async fn add(&self, title: &str, content: &str) -> Result<String> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }

        let image_url = self.providers.image()?.generate(title).await?;
        let (bytes, name) = self.files.fetch_url(&image_url).await?;

        let id = new_record_id();
        let thumb = self.files.save(COLLECTION, &id, &name, &bytes).await?;

        let new_essay = NewEssay {
            id: id.clone(),
            title: title.to_string(),
            content: content.to_string(),
            thumb: Some(thumb),
            ..Default::default()
        };
        if let Err(e) = self.repo.insert_essay(new_essay).await {
            tracing::error!("Failed to save essay: {}", e);
            if let Err(cleanup) = self.files.remove_record(COLLECTION, &id).await {
                tracing::warn!("Failed to remove files of unsaved essay {}: {}", id, cleanup);
            }
            return Err(e);
        }
        tracing::info!("Created essay {} ({})", id, title);

        let service = self.clone();
        let essay_id = id.clone();
        self.tasks.submit(TaskKind::Publish, &id, async move {
            service.publish(&essay_id).await
        });

        let service = self.clone();
        let essay_id = id.clone();
        self.tasks.submit(TaskKind::Synthesize, &id, async move {
            service.synthesize(&essay_id).await
        });

        Ok(id)
    }

    /// Publishes the essay to Telegraph and records the page URL,
    /// overwriting any earlier one.
    pub async fn publish(&self, id: &str) -> Result<()> {
        let essay = self.repo.get_essay(id).await?.ok_or_else(|| not_found(id))?;
        if essay.content.is_empty() {
            tracing::info!("Essay {} has no content, skipping publish", id);
            return Ok(());
        }

        let image_url = essay
            .thumb
            .as_deref()
            .map(|thumb| self.files.url(COLLECTION, &essay.id, thumb));

        let page = self
            .providers
            .telegraph()?
            .create_page(&essay.title, &essay.content, image_url.as_deref())
            .await
            .inspect_err(|e| tracing::error!("Failed to publish essay {}: {}", id, e))?;

        self.save_with_retry(id, |_| EssayPatch {
            telegraph: Some(page.url.clone()),
            ..Default::default()
        })
        .await?;
        tracing::info!("Published essay {} to {} (page {})", id, page.url, page.path);
        Ok(())
    }

    /// Renders the content to audio and attaches it as the essay's file.
    async fn synthesize(&self, id: &str) -> Result<()> {
        let essay = self.repo.get_essay(id).await?.ok_or_else(|| not_found(id))?;
        if essay.content.is_empty() {
            tracing::info!("Essay {} has no content, skipping synthesis", id);
            return Ok(());
        }

        let speech = self.providers.speech()?;
        let audio = speech.synthesize(&essay.content).await?;
        let file_name = format!("{}.{}", essay.title, speech.file_extension());
        let stored = self.files.save(COLLECTION, id, &file_name, &audio).await?;

        self.save_with_retry(id, |_| EssayPatch {
            file: Some(Some(stored.clone())),
            ..Default::default()
        })
        .await?;
        tracing::info!("Synthesized audio for essay {}", id);
        Ok(())
    }

    /// Completes an asynchronous synthesis job: the essay whose `task_id`
    /// matches gets the callback's captions and audio in one save.
    pub async fn notify(&self, callback: TtsCallback) -> Result<()> {
        let data = callback.data;
        let task_id = data.task_id.trim();
        if task_id.is_empty() {
            return Err(AppError::Validation("taskId is required".to_string()));
        }
        tracing::info!("Synthesis callback for task {}", task_id);

        let matches = self.repo.find_essays_by_task_id(task_id).await?;
        let Some(essay) = matches.first() else {
            return Err(AppError::NotFound(format!("essay with task_id {task_id}")));
        };
        if matches.len() > 1 {
            tracing::warn!(
                "{} essays share task_id {}, updating only the earliest ({})",
                matches.len(),
                task_id,
                essay.id
            );
        }

        let (bytes, name) = self.files.fetch_url(&data.audio_address).await?;
        let stored = self.files.save(COLLECTION, &essay.id, &name, &bytes).await?;

        self.save_with_retry(&essay.id, |_| EssayPatch {
            sentences: Some(data.sentences.clone()),
            file: Some(Some(stored.clone())),
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    pub async fn list(
        &self,
        filter: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<EssaySummary>> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let essays = self
            .repo
            .list_essays(filter, limit, offset.unwrap_or(0))
            .await?;
        Ok(essays.into_iter().map(EssaySummary::from).collect())
    }

    pub async fn detail(&self, id: &str) -> Result<EssayDetail> {
        let essay = self.repo.get_essay(id).await?.ok_or_else(|| not_found(id))?;
        Ok(self.to_detail(essay))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.repo.delete_essay(id).await? {
            return Err(not_found(id));
        }
        if let Err(e) = self.files.remove_record(COLLECTION, id).await {
            tracing::warn!("Failed to remove files of essay {}: {}", id, e);
        }
        tracing::info!("Deleted essay {}", id);
        Ok(())
    }

    pub async fn update_file_id(&self, id: &str, file_id: &str) -> Result<()> {
        self.save_with_retry(id, |_| EssayPatch {
            file_id: Some(file_id.to_string()),
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    /// Generic record create. Runs the after-create hook once the row is
    /// committed; a hook failure is returned but the row stays.
    pub async fn create_record(&self, input: RecordInput) -> Result<EssayDetail> {
        if input.title.trim().is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        let essay = self
            .repo
            .insert_essay(NewEssay {
                title: input.title,
                content: input.content,
                essay_type: input.essay_type,
                video_link: input.video_link,
                ..Default::default()
            })
            .await?;

        self.after_create(&essay.id).await?;
        self.detail(&essay.id).await
    }

    /// Generic record update, followed by the after-update hook.
    pub async fn update_record(&self, id: &str, patch: RecordPatch) -> Result<EssayDetail> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(AppError::Validation("title cannot be empty".to_string()));
        }
        let patch = EssayPatch::from(patch);
        if patch.is_empty() {
            return Err(AppError::Validation("nothing to update".to_string()));
        }

        self.save_with_retry(id, |_| patch.clone()).await?;
        self.after_update(id).await?;
        self.detail(id).await
    }

    async fn after_create(&self, id: &str) -> Result<()> {
        self.publish(id).await
    }

    async fn after_update(&self, id: &str) -> Result<()> {
        self.publish(id).await
    }

    /// Re-reads the essay and applies `patch_for` against its current
    /// revision, retrying when another writer got there first.
    async fn save_with_retry<F>(&self, id: &str, mut patch_for: F) -> Result<Essay>
    where
        F: FnMut(&Essay) -> EssayPatch,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.repo.get_essay(id).await?.ok_or_else(|| not_found(id))?;
            let patch = patch_for(&current);

            match self.repo.update_essay(id, current.revision, patch).await {
                Err(AppError::Conflict(_)) if attempt < MAX_SAVE_ATTEMPTS => {
                    tracing::debug!("Essay {} changed during save, retrying ({})", id, attempt);
                }
                result => return result,
            }
        }
    }

    fn to_detail(&self, essay: Essay) -> EssayDetail {
        let url = |name: &Option<String>| {
            name.as_deref()
                .map(|n| self.files.url(COLLECTION, &essay.id, n))
                .unwrap_or_default()
        };
        let file = url(&essay.file);
        let thumb = url(&essay.thumb);

        EssayDetail {
            file,
            thumb,
            id: essay.id,
            created: essay.created,
            updated: essay.updated,
            title: essay.title,
            content: essay.content,
            file_id: essay.file_id,
            telegraph: essay.telegraph,
            sentences: essay.sentences,
            essay_type: essay.essay_type,
            video_link: essay.video_link,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Sentence, TtsCallbackData};
    use crate::testing::{Harness, APP_URL, IMAGE_PATH, TELEGRAPH_PATH, TTS_PATH};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    async fn insert(h: &Harness, title: &str, content: &str) -> Essay {
        h.repo
            .insert_essay(NewEssay {
                title: title.to_string(),
                content: content.to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    async fn set_task_id(h: &Harness, essay: &Essay, task_id: &str) -> Essay {
        let patch = EssayPatch {
            task_id: Some(task_id.to_string()),
            ..Default::default()
        };
        h.repo.update_essay(&essay.id, essay.revision, patch).await.unwrap()
    }

    fn callback(task_id: &str, audio_address: &str, sentences: Vec<Sentence>) -> TtsCallback {
        TtsCallback {
            data: TtsCallbackData {
                task_id: task_id.to_string(),
                sentences,
                audio_address: audio_address.to_string(),
            },
        }
    }

    fn sentence(text: &str, begin: i64, end: i64) -> Sentence {
        Sentence {
            text: text.to_string(),
            begin_time: begin,
            end_time: end,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn add_attaches_thumbnail_then_publishes_and_synthesizes() {
        let h = Harness::new().await;
        h.mock_image(b"cover-bytes").await;
        h.mock_telegraph("https://telegra.ph/T-01").await;
        h.mock_tts(b"mp3-bytes").await;

        let id = h.service.add("T", "C").await.unwrap();

        let stored = h.repo.get_essay(&id).await.unwrap().unwrap();
        let thumb = stored.thumb.clone().unwrap();
        assert!(thumb.starts_with("cover_") && thumb.ends_with(".png"), "{thumb}");
        assert_eq!(h.files.read(COLLECTION, &id, &thumb).await.unwrap(), b"cover-bytes");

        h.service.tasks().wait_idle().await;
        let stats = h.service.tasks().stats();
        assert_eq!((stats.succeeded, stats.failed), (2, 0));

        let essay = h.repo.get_essay(&id).await.unwrap().unwrap();
        assert_eq!(essay.telegraph, "https://telegra.ph/T-01");
        let audio = essay.file.unwrap();
        assert!(audio.starts_with("T_") && audio.ends_with(".mp3"), "{audio}");
        assert_eq!(h.files.read(COLLECTION, &id, &audio).await.unwrap(), b"mp3-bytes");
        assert!(essay.task_id.is_empty());
        assert!(essay.sentences.is_empty());
    }

    #[tokio::test]
    async fn add_persists_nothing_when_image_generation_fails() {
        let h = Harness::new().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&h.server)
            .await;

        let err = h.service.add("T", "C").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { .. }));
        assert!(h.service.list("", None, None).await.unwrap().is_empty());
        assert_eq!(h.service.tasks().stats().submitted, 0);
    }

    #[tokio::test]
    async fn add_requires_a_title() {
        let h = Harness::new().await;
        let err = h.service.add("  ", "C").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(h.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn background_failures_do_not_reach_add() {
        let h = Harness::new().await;
        h.mock_image(b"img").await;
        Mock::given(method("POST"))
            .and(path(TELEGRAPH_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&h.server)
            .await;
        h.mock_tts(b"mp3").await;

        let id = h.service.add("T", "C").await.unwrap();
        h.service.tasks().wait_idle().await;

        let stats = h.service.tasks().stats();
        assert_eq!((stats.succeeded, stats.failed), (1, 1));
        assert_eq!(stats.recent_failures[0].kind, TaskKind::Publish);
        let essay = h.repo.get_essay(&id).await.unwrap().unwrap();
        assert!(essay.telegraph.is_empty());
        assert!(essay.file.is_some());
    }

    #[tokio::test]
    async fn empty_content_skips_publish_and_synthesis() {
        let h = Harness::new().await;
        h.mock_telegraph("https://telegra.ph/x").await;
        h.mock_tts(b"mp3").await;
        let essay = insert(&h, "Draft", "").await;

        h.service.publish(&essay.id).await.unwrap();
        h.service.synthesize(&essay.id).await.unwrap();

        assert_eq!(h.requests_to(TELEGRAPH_PATH).await, 0);
        assert_eq!(h.requests_to(TTS_PATH).await, 0);
        assert_eq!(h.repo.get_essay(&essay.id).await.unwrap().unwrap(), essay);
    }

    #[tokio::test]
    async fn publishing_again_overwrites_the_mirror() {
        let h = Harness::new().await;
        Mock::given(method("POST"))
            .and(path(TELEGRAPH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true, "result": {"path": "a", "url": "https://telegra.ph/a"}
            })))
            .up_to_n_times(1)
            .mount(&h.server)
            .await;
        h.mock_telegraph("https://telegra.ph/b").await;
        let essay = insert(&h, "Twice", "Body").await;

        h.service.publish(&essay.id).await.unwrap();
        assert_eq!(h.repo.get_essay(&essay.id).await.unwrap().unwrap().telegraph, "https://telegra.ph/a");

        h.service.publish(&essay.id).await.unwrap();
        let essay = h.repo.get_essay(&essay.id).await.unwrap().unwrap();
        assert_eq!(essay.telegraph, "https://telegra.ph/b");
        assert_eq!(essay.revision, 3);
    }

    #[tokio::test]
    async fn publish_links_the_thumbnail() {
        let h = Harness::new().await;
        h.mock_telegraph("https://telegra.ph/x").await;
        let essay = h
            .repo
            .insert_essay(NewEssay {
                title: "Pic".into(),
                content: "Body".into(),
                thumb: Some("cover_1.png".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        h.service.publish(&essay.id).await.unwrap();

        let requests = h.server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(body.contains(&format!("{APP_URL}/api/files/essay/{}/cover_1.png", essay.id)));
    }

    #[tokio::test]
    async fn publish_failure_leaves_record_unchanged() {
        let h = Harness::new().await;
        Mock::given(method("POST"))
            .and(path(TELEGRAPH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false, "error": "CONTENT_TOO_BIG"
            })))
            .mount(&h.server)
            .await;
        let essay = insert(&h, "Big", "Body").await;

        let err = h.service.publish(&essay.id).await.unwrap_err();
        assert!(err.to_string().contains("CONTENT_TOO_BIG"));
        assert_eq!(h.repo.get_essay(&essay.id).await.unwrap().unwrap(), essay);
    }

    #[tokio::test]
    async fn notify_sets_sentences_and_audio() {
        let h = Harness::new().await;
        Mock::given(method("GET"))
            .and(path("/audio/job-1.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"final-audio".to_vec()))
            .mount(&h.server)
            .await;
        let essay = insert(&h, "Listen", "Words.").await;
        set_task_id(&h, &essay, "job-1").await;
        let sentences = vec![sentence("Words.", 0, 900)];

        let audio_url = format!("{}/audio/job-1.mp3", h.server.uri());
        h.service
            .notify(callback("job-1", &audio_url, sentences.clone()))
            .await
            .unwrap();

        let essay = h.repo.get_essay(&essay.id).await.unwrap().unwrap();
        assert_eq!(essay.sentences, sentences);
        let file = essay.file.unwrap();
        assert_eq!(h.files.read(COLLECTION, &essay.id, &file).await.unwrap(), b"final-audio");
    }

    #[tokio::test]
    async fn notify_without_a_match_fails_and_mutates_nothing() {
        let h = Harness::new().await;
        let essay = insert(&h, "Other", "x").await;
        let essay = set_task_id(&h, &essay, "job-2").await;

        let audio_url = format!("{}/audio/a.mp3", h.server.uri());
        let err = h
            .service
            .notify(callback("job-unknown", &audio_url, vec![sentence("x", 0, 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(h.repo.get_essay(&essay.id).await.unwrap().unwrap(), essay);
        assert!(h.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notify_rejects_blank_task_id() {
        let h = Harness::new().await;
        let err = h.service.notify(callback(" ", "http://a/b.mp3", vec![])).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn notify_with_shared_task_id_updates_only_the_earliest() {
        let h = Harness::new().await;
        Mock::given(method("GET"))
            .and(path("/audio/dup.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"a".to_vec()))
            .mount(&h.server)
            .await;
        let first = insert(&h, "First", "x").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = insert(&h, "Second", "y").await;
        set_task_id(&h, &first, "dup").await;
        let second = set_task_id(&h, &second, "dup").await;

        let audio_url = format!("{}/audio/dup.mp3", h.server.uri());
        h.service
            .notify(callback("dup", &audio_url, vec![sentence("x", 0, 5)]))
            .await
            .unwrap();

        assert!(h.repo.get_essay(&first.id).await.unwrap().unwrap().file.is_some());
        assert_eq!(h.repo.get_essay(&second.id).await.unwrap().unwrap(), second);
    }

    #[tokio::test]
    async fn detail_rewrites_files_into_urls() {
        let h = Harness::new().await;
        let essay = h
            .repo
            .insert_essay(NewEssay {
                title: "D".into(),
                content: "c".into(),
                thumb: Some("t_1.png".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let detail = h.service.detail(&essay.id).await.unwrap();
        assert_eq!(detail.thumb, format!("{APP_URL}/api/files/essay/{}/t_1.png", essay.id));
        assert_eq!(detail.file, "");
        assert_eq!(detail.content, "c");

        let err = h.service.detail("missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_then_detail_is_not_found() {
        let h = Harness::new().await;
        let essay = insert(&h, "Gone", "soon").await;
        h.files.save(COLLECTION, &essay.id, "a.mp3", b"x").await.unwrap();

        h.service.delete(&essay.id).await.unwrap();
        assert!(matches!(h.service.detail(&essay.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(h.service.delete(&essay.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_file_id_patches_one_field() {
        let h = Harness::new().await;
        let essay = insert(&h, "F", "c").await;

        h.service.update_file_id(&essay.id, "CQAC-9").await.unwrap();
        let updated = h.repo.get_essay(&essay.id).await.unwrap().unwrap();
        assert_eq!(updated.file_id, "CQAC-9");
        assert_eq!(updated.title, essay.title);
        assert_eq!(updated.revision, essay.revision + 1);

        let err = h.service.update_file_id("missing", "x").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_summarizes_newest_first_and_clamps_limit() {
        let h = Harness::new().await;
        for i in 0..3 {
            insert(&h, &format!("e{i}"), "c").await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let all = h.service.list("", None, None).await.unwrap();
        let titles: Vec<_> = all.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["e2", "e1", "e0"]);

        assert_eq!(h.service.list("", Some(0), None).await.unwrap().len(), 1);
        let page = h.service.list("", Some(2), Some(2)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "e0");

        let filtered = h.service.list("title = 'e1'", None, None).await.unwrap();
        assert_eq!(filtered.len(), 1);

        let err = h.service.list("title = ", None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[tokio::test]
    async fn record_create_and_update_both_publish() {
        let h = Harness::new().await;
        h.mock_telegraph("https://telegra.ph/rec").await;

        let created = h
            .service
            .create_record(RecordInput {
                title: "Rec".into(),
                content: "v1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.telegraph, "https://telegra.ph/rec");
        assert_eq!(created.thumb, "");

        let updated = h
            .service
            .update_record(
                &created.id,
                RecordPatch {
                    content: Some("v2".into()),
                    task_id: Some("job-7".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.content, "v2");
        assert_eq!(h.requests_to(TELEGRAPH_PATH).await, 2);
        let stored = h.repo.get_essay(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.task_id, "job-7");
    }

    #[tokio::test]
    async fn record_hook_failure_keeps_the_row() {
        let h = Harness::new().await;
        let err = h
            .service
            .create_record(RecordInput {
                title: "NoMirror".into(),
                content: "text".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upstream { .. }));
        assert_eq!(h.service.list("", None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_update_validates_patch() {
        let h = Harness::new().await;
        let essay = insert(&h, "V", "").await;

        let err = h
            .service
            .update_record(&essay.id, RecordPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = h
            .service
            .update_record(
                &essay.id,
                RecordPatch {
                    title: Some(" ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = h
            .service
            .update_record(
                "missing",
                RecordPatch {
                    content: Some("x".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_write_is_merged_by_retry() {
        let h = Harness::new().await;
        let essay = insert(&h, "Race", "c").await;
        let repo = h.repo.clone();
        let mut interleaved = false;

        let saved = h
            .service
            .save_with_retry(&essay.id, |current| {
                if !interleaved {
                    interleaved = true;
                    let patch = EssayPatch {
                        essay_type: Some("note".into()),
                        ..Default::default()
                    };
                    tokio::task::block_in_place(|| {
                        tokio::runtime::Handle::current()
                            .block_on(repo.update_essay(&current.id, current.revision, patch))
                    })
                    .unwrap();
                }
                EssayPatch {
                    video_link: Some("https://v/1".into()),
                    ..Default::default()
                }
            })
            .await
            .unwrap();

        assert_eq!(saved.essay_type, "note");
        assert_eq!(saved.video_link, "https://v/1");
        assert_eq!(saved.revision, 3);
    }

    #[tokio::test]
    async fn provider_outages_surface_as_upstream() {
        let h = Harness::new().await;
        Mock::given(method("POST"))
            .and(path(IMAGE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&h.server)
            .await;
        let err = h.service.add("T", "C").await.unwrap_err();
        assert_eq!(err.code(), 502, "{err:?}");
        assert!(h.service.list("", None, None).await.unwrap().is_empty());

        let essay = insert(&h, "Late", "x").await;
        let essay = set_task_id(&h, &essay, "job-9").await;
        let err = h
            .service
            .notify(callback("job-9", "http://127.0.0.1:1/a.mp3", vec![sentence("x", 0, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), 502, "{err:?}");
        assert_eq!(h.repo.get_essay(&essay.id).await.unwrap().unwrap(), essay);
    }
}
