//! Types for files, packages and the two package lists.

use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a file row.
pub type FileId = i64;

/// Store-assigned identifier of a package row.
pub type PackageId = i64;

/// Status of a file. The integer codes are persisted and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Finished,
    Offline,
    Online,
    Queued,
    Checking,
    Waiting,
    Reconnected,
    Starting,
    Failed,
    Aborted,
    Decrypting,
    Custom,
    Downloading,
    Processing,
}

impl FileStatus {
    /// Statuses a file must have to be handed out as a job.
    pub const ELIGIBLE: [FileStatus; 3] = [
        FileStatus::Online,
        FileStatus::Queued,
        FileStatus::Reconnected,
    ];

    /// Persisted integer code.
    pub fn code(self) -> i64 {
        match self {
            FileStatus::Finished => 0,
            FileStatus::Offline => 1,
            FileStatus::Online => 2,
            FileStatus::Queued => 3,
            FileStatus::Checking => 4,
            FileStatus::Waiting => 5,
            FileStatus::Reconnected => 6,
            FileStatus::Starting => 7,
            FileStatus::Failed => 8,
            FileStatus::Aborted => 9,
            FileStatus::Decrypting => 10,
            FileStatus::Custom => 11,
            FileStatus::Downloading => 12,
            FileStatus::Processing => 13,
        }
    }

    /// Decode a persisted integer code.
    pub fn from_code(code: i64) -> Option<Self> {
        let status = match code {
            0 => FileStatus::Finished,
            1 => FileStatus::Offline,
            2 => FileStatus::Online,
            3 => FileStatus::Queued,
            4 => FileStatus::Checking,
            5 => FileStatus::Waiting,
            6 => FileStatus::Reconnected,
            7 => FileStatus::Starting,
            8 => FileStatus::Failed,
            9 => FileStatus::Aborted,
            10 => FileStatus::Decrypting,
            11 => FileStatus::Custom,
            12 => FileStatus::Downloading,
            13 => FileStatus::Processing,
            _ => return None,
        };
        Some(status)
    }

    /// Returns the string representation used in events and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Finished => "finished",
            FileStatus::Offline => "offline",
            FileStatus::Online => "online",
            FileStatus::Queued => "queued",
            FileStatus::Checking => "checking",
            FileStatus::Waiting => "waiting",
            FileStatus::Reconnected => "reconnected",
            FileStatus::Starting => "starting",
            FileStatus::Failed => "failed",
            FileStatus::Aborted => "aborted",
            FileStatus::Decrypting => "decrypting",
            FileStatus::Custom => "custom",
            FileStatus::Downloading => "downloading",
            FileStatus::Processing => "processing",
        }
    }

    /// Whether a file in this status may be dispatched to a worker.
    pub fn is_eligible(&self) -> bool {
        Self::ELIGIBLE.contains(self)
    }
}

/// Which of the two package lists a package belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    /// Unscheduled packages awaiting promotion.
    #[default]
    Collector,
    /// Packages eligible for download.
    Queue,
}

impl ListKind {
    /// Persisted list-membership flag.
    pub fn flag(self) -> i64 {
        match self {
            ListKind::Collector => 0,
            ListKind::Queue => 1,
        }
    }

    pub fn from_flag(flag: i64) -> Option<Self> {
        match flag {
            0 => Some(ListKind::Collector),
            1 => Some(ListKind::Queue),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Collector => "collector",
            ListKind::Queue => "queue",
        }
    }
}

/// Target slot for a reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// An explicit slot, clamped to the end of the scope.
    At(i64),
    /// Append after every other entity of the scope.
    Last,
}

impl From<i64> for Position {
    /// Negative values are the legacy append sentinel.
    fn from(value: i64) -> Self {
        if value < 0 {
            Position::Last
        } else {
            Position::At(value)
        }
    }
}

/// Persisted state of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub url: String,
    pub name: String,
    /// Size in bytes, 0 when unknown.
    pub size: i64,
    pub status: FileStatus,
    /// Name of the plugin that handles this url.
    pub plugin: String,
    pub error: String,
    /// Dense index within the owning package.
    pub position: i64,
    pub package_id: PackageId,
}

/// Persisted state of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: PackageId,
    pub name: String,
    pub folder: String,
    pub site: String,
    pub password: String,
    pub list: ListKind,
    /// Dense index within the package's list.
    pub position: i64,
    pub priority: i64,
}

/// A file to insert into a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub url: String,
    pub name: String,
    pub plugin: String,
}

impl NewFile {
    /// A file whose display name starts out as its url.
    pub fn from_url(url: impl Into<String>, plugin: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: url.clone(),
            url,
            plugin: plugin.into(),
        }
    }
}

/// A package to insert into a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPackage {
    pub name: String,
    pub folder: String,
    pub list: ListKind,
}

impl NewPackage {
    pub fn new(name: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            folder: folder.into(),
            list: ListKind::Collector,
        }
    }

    pub fn in_list(mut self, list: ListKind) -> Self {
        self.list = list;
        self
    }
}

/// File as presented to observers, with live values merged in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileView {
    #[serde(flatten)]
    pub file: FileRecord,
    /// Whether the values came from a live cache entry.
    pub live: bool,
}

/// Package with its files, in position order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageView {
    #[serde(flatten)]
    pub package: PackageRecord,
    pub files: Vec<FileView>,
}
