pub const SCHEMA: &str = r#"
-- essays table
CREATE TABLE IF NOT EXISTS essays (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    thumb TEXT NOT NULL DEFAULT '',
    file TEXT NOT NULL DEFAULT '',
    file_id TEXT NOT NULL DEFAULT '',
    task_id TEXT NOT NULL DEFAULT '',
    sentences TEXT NOT NULL DEFAULT '[]',
    telegraph TEXT NOT NULL DEFAULT '',
    essay_type TEXT NOT NULL DEFAULT '',
    video_link TEXT NOT NULL DEFAULT '',
    revision INTEGER NOT NULL DEFAULT 1,
    created TEXT NOT NULL,
    updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_essays_created ON essays(created DESC);
CREATE INDEX IF NOT EXISTS idx_essays_task_id ON essays(task_id);

-- secrets table
CREATE TABLE IF NOT EXISTS secrets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    uri TEXT NOT NULL DEFAULT '',
    api_key TEXT NOT NULL DEFAULT '',
    secret_key TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    ext TEXT NOT NULL DEFAULT '{}',
    created TEXT NOT NULL,
    updated TEXT NOT NULL
);
"#;

pub const ESSAY_FILTER_FIELDS: &[&str] = &[
    "id",
    "title",
    "content",
    "file_id",
    "task_id",
    "telegraph",
    "essay_type",
    "video_link",
    "created",
    "updated",
];

pub const SECRET_FILTER_FIELDS: &[&str] = &["id", "name", "uri", "description", "created", "updated"];
