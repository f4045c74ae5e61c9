//! Built-in project templates: seed features, releases and notes applied to a
//! freshly created project.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{DevhubError, Result};
use crate::model::{FeatureDraft, NoteDraft, ReleaseDraft};
use crate::types::{FeatureStatus, ReleaseStatus};

#[derive(Debug, Clone, Serialize)]
pub struct TemplateFeature {
    pub title: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub status: FeatureStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateRelease {
    pub version: &'static str,
    pub notes: &'static str,
    pub category: &'static str,
    pub status: ReleaseStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateNote {
    pub title: &'static str,
    pub category: &'static str,
    /// Plain-text paragraphs, rendered into a rich-text document on seeding.
    pub paragraphs: &'static [&'static str],
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub features: &'static [TemplateFeature],
    pub releases: &'static [TemplateRelease],
    pub notes: &'static [TemplateNote],
}

impl ProjectTemplate {
    pub fn feature_drafts(&self, project_id: &str) -> Vec<FeatureDraft> {
        self.features
            .iter()
            .enumerate()
            .map(|(i, f)| FeatureDraft {
                project_id: project_id.to_string(),
                title: f.title.to_string(),
                description: f.description.to_string(),
                category: Some(f.category.to_string()),
                status: f.status,
                due_date: None,
                order_index: Some(i as i64),
            })
            .collect()
    }

    pub fn release_drafts(&self, project_id: &str) -> Vec<ReleaseDraft> {
        self.releases
            .iter()
            .map(|r| ReleaseDraft {
                project_id: project_id.to_string(),
                version: r.version.to_string(),
                target_date: None,
                category: Some(r.category.to_string()),
                status: r.status,
                notes: r.notes.to_string(),
            })
            .collect()
    }

    pub fn note_drafts(&self, project_id: &str, user_id: &str) -> Vec<NoteDraft> {
        self.notes
            .iter()
            .map(|n| NoteDraft {
                project_id: project_id.to_string(),
                user_id: user_id.to_string(),
                title: n.title.to_string(),
                category: Some(n.category.to_string()),
                content: Some(document(n.title, n.paragraphs)),
            })
            .collect()
    }
}

fn document(heading: &str, paragraphs: &[&str]) -> Value {
    let mut content = vec![json!({
        "type": "heading",
        "attrs": { "level": 1 },
        "content": [{ "type": "text", "text": heading }],
    })];
    content.extend(paragraphs.iter().map(|p| {
        json!({
            "type": "paragraph",
            "content": [{ "type": "text", "text": p }],
        })
    }));
    json!({ "type": "doc", "content": content })
}

pub fn all() -> &'static [ProjectTemplate] {
    TEMPLATES
}

pub fn find(id: &str) -> Result<&'static ProjectTemplate> {
    TEMPLATES
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| DevhubError::validation(format!("unknown template '{id}'")))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

const fn feature(title: &'static str, description: &'static str, category: &'static str) -> TemplateFeature {
    TemplateFeature {
        title,
        description,
        category,
        status: FeatureStatus::Planned,
    }
}

const fn release(version: &'static str, notes: &'static str, category: &'static str) -> TemplateRelease {
    TemplateRelease {
        version,
        notes,
        category,
        status: ReleaseStatus::Planned,
    }
}

static TEMPLATES: &[ProjectTemplate] = &[
    ProjectTemplate {
        id: "web-app",
        name: "Web Application",
        description: "Modern web application with a component UI and an API layer",
        category: "Web Development",
        features: &[
            feature("Setup Project Structure", "Repository layout, tooling and CI", "setup"),
            feature("Authentication System", "Sign up, sign in and session handling", "feature"),
            feature("Database Schema", "Tables, relations and access policies", "feature"),
            feature("UI Component Library", "Shared buttons, forms and layout primitives", "feature"),
            feature("API Routes", "Server endpoints for the core resources", "feature"),
            feature("Error Handling", "Error boundaries and user-facing messages", "feature"),
            feature("Responsive Design", "Layouts for mobile, tablet and desktop", "feature"),
            feature("SEO Optimization", "Metadata, sitemap and structured data", "enhancement"),
        ],
        releases: &[
            release("0.1.0", "Project skeleton and authentication", "minor"),
            release("0.2.0", "Core features usable end to end", "minor"),
            release("1.0.0", "Public launch", "major"),
        ],
        notes: &[
            TemplateNote {
                title: "Project Setup Guide",
                category: "documentation",
                paragraphs: &[
                    "Install a current LTS runtime and a package manager.",
                    "Initialize the project, then run the development server.",
                ],
            },
            TemplateNote {
                title: "Development Workflow",
                category: "documentation",
                paragraphs: &[
                    "Work on short-lived branches and open a pull request per feature.",
                    "Every pull request runs lint, type checks and tests.",
                ],
            },
        ],
    },
    ProjectTemplate {
        id: "mobile-app",
        name: "Mobile Application",
        description: "Cross-platform mobile application",
        category: "Mobile Development",
        features: &[
            feature("Project Setup", "Toolchain, simulators and device builds", "setup"),
            feature("Navigation System", "Stack and tab navigation", "feature"),
            feature("Authentication", "Sign in and secure token storage", "feature"),
            feature("Local Storage", "Persisted app state", "feature"),
            feature("Push Notifications", "Notification permissions and delivery", "feature"),
            feature("Offline Support", "Queue writes while offline", "enhancement"),
        ],
        releases: &[
            release("0.1.0", "Internal test build", "minor"),
            release("1.0.0", "Store release", "major"),
        ],
        notes: &[TemplateNote {
            title: "Environment Setup",
            category: "documentation",
            paragraphs: &[
                "Install the platform SDKs and create an emulator for each target.",
                "Run the app on a physical device before every release.",
            ],
        }],
    },
    ProjectTemplate {
        id: "api-service",
        name: "REST API Backend",
        description: "HTTP API service with persistence and authentication",
        category: "Backend Development",
        features: &[
            feature("Server Setup", "HTTP server, routing and configuration", "setup"),
            feature("Database Integration", "Connection pool and migrations", "feature"),
            feature("Authentication Middleware", "Token validation on protected routes", "feature"),
            feature("CRUD Operations", "Create, read, update and delete endpoints", "feature"),
            feature("Input Validation", "Reject malformed requests early", "feature"),
            feature("API Documentation", "Published endpoint reference", "documentation"),
            feature("Rate Limiting", "Per-client request quotas", "security"),
        ],
        releases: &[
            release("0.1.0", "First endpoints behind authentication", "minor"),
            release("1.0.0", "Stable public API", "major"),
        ],
        notes: &[TemplateNote {
            title: "API Architecture Guide",
            category: "documentation",
            paragraphs: &[
                "Resources map to plural nouns; verbs come from the HTTP method.",
                "Errors return a JSON body with a machine-readable code and a message.",
            ],
        }],
    },
];
