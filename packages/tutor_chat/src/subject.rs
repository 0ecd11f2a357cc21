//! The fixed subject table shared by conversation display and reply selection.

/// Display metadata for one subject tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectInfo {
    pub value: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
}

pub const DEFAULT_SUBJECT: &str = "general";

pub const SUBJECTS: &[SubjectInfo] = &[
    SubjectInfo {
        value: "general",
        label: "General",
        icon: "🧠",
    },
    SubjectInfo {
        value: "physics",
        label: "Physics",
        icon: "🔭",
    },
    SubjectInfo {
        value: "math",
        label: "Mathematics",
        icon: "🧮",
    },
    SubjectInfo {
        value: "history",
        label: "History",
        icon: "🏛️",
    },
    SubjectInfo {
        value: "literature",
        label: "Literature",
        icon: "📚",
    },
    SubjectInfo {
        value: "biology",
        label: "Biology",
        icon: "🧬",
    },
    SubjectInfo {
        value: "chemistry",
        label: "Chemistry",
        icon: "⚗️",
    },
    SubjectInfo {
        value: "computer-science",
        label: "Computer Science",
        icon: "💻",
    },
    SubjectInfo {
        value: "geography",
        label: "Geography",
        icon: "🌍",
    },
    SubjectInfo {
        value: "art",
        label: "Art",
        icon: "🎨",
    },
    SubjectInfo {
        value: "music",
        label: "Music",
        icon: "🎵",
    },
];

/// Exact match on the subject tag.
pub fn lookup(tag: &str) -> Option<&'static SubjectInfo> {
    SUBJECTS.iter().find(|s| s.value == tag)
}

/// Like [`lookup`], but unknown tags fall back to `general`.
pub fn resolve(tag: &str) -> &'static SubjectInfo {
    lookup(tag).unwrap_or(&SUBJECTS[0])
}
