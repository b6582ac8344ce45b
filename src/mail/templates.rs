//! Per-kind mail templates.
//!
//! A template file is plain text: the first line is the subject, the rest is
//! the body. Placeholders are `{{name}}`, `{{email}}`, `{{code}}`,
//! `{{link}}` and `{{provider}}`; unknown placeholders are left as is.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::challenge::ChallengeKind;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailTemplate {
    pub subject: String,
    pub body: String,
}

impl EmailTemplate {
    fn parse(text: &str) -> Option<Self> {
        let (subject, body) = text.split_once('\n').unwrap_or((text, ""));
        let subject = subject.trim();
        if subject.is_empty() {
            return None;
        }
        Some(Self {
            subject: subject.to_string(),
            body: body.trim_start_matches(['\r', '\n']).to_string(),
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateData<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub code: &'a str,
    pub link: &'a str,
    pub provider: &'a str,
}

/// Immutable after construction.
#[derive(Clone, Debug)]
pub struct TemplateMap {
    templates: HashMap<ChallengeKind, EmailTemplate>,
}

fn default_template(kind: ChallengeKind) -> EmailTemplate {
    let (subject, body) = match kind {
        ChallengeKind::Authenticate => (
            "{{provider}}: sign-in code",
            "Hi {{name}},\n\nYour sign-in code is {{code}}.\n",
        ),
        ChallengeKind::Recover => (
            "{{provider}}: recover your account",
            "Hi {{name}},\n\nUse the code {{code}} on the page below to choose a new password.\n\n{{link}}\n\nIf you did not ask for this, ignore this email.\n",
        ),
        ChallengeKind::Delete => (
            "{{provider}}: confirm account deletion",
            "Hi {{name}},\n\nYour account deletion code is {{code}}.\n\nIf you did not ask for this, change your password.\n",
        ),
        ChallengeKind::EmailConfirm => (
            "{{provider}}: confirm your email address",
            "Hi {{name}},\n\nConfirm {{email}} with the code {{code}}:\n\n{{link}}\n",
        ),
        ChallengeKind::EmailChange => (
            "{{provider}}: confirm your new email address",
            "Hi {{name}},\n\nTo use {{email}} for your account, enter the code {{code}}:\n\n{{link}}\n",
        ),
    };
    EmailTemplate {
        subject: subject.to_string(),
        body: body.to_string(),
    }
}

fn substitute(template: &str, data: &TemplateData<'_>) -> String {
    [
        ("{{name}}", data.name),
        ("{{email}}", data.email),
        ("{{code}}", data.code),
        ("{{link}}", data.link),
        ("{{provider}}", data.provider),
    ]
    .iter()
    .fold(template.to_string(), |text, (placeholder, value)| {
        text.replace(placeholder, value)
    })
}

impl Default for TemplateMap {
    fn default() -> Self {
        Self {
            templates: ChallengeKind::ALL
                .into_iter()
                .map(|kind| (kind, default_template(kind)))
                .collect(),
        }
    }
}

impl TemplateMap {
    /// Defaults, overridden by any `<dir>/<kind>.txt` that exists.
    ///
    /// # Errors
    /// Fails if an existing template file cannot be read or has no subject.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut map = Self::default();
        for kind in ChallengeKind::ALL {
            let path = dir.join(format!("{}.txt", kind.as_str()));
            if !path.is_file() {
                continue;
            }
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template {}", path.display()))?;
            let template = EmailTemplate::parse(&text)
                .with_context(|| format!("Template {} has no subject line", path.display()))?;
            debug!("loaded template {}", path.display());
            map.templates.insert(kind, template);
        }
        Ok(map)
    }

    #[must_use]
    pub fn get(&self, kind: ChallengeKind) -> Option<&EmailTemplate> {
        self.templates.get(&kind)
    }

    /// Subject and body with placeholders filled in.
    #[must_use]
    pub fn render(&self, kind: ChallengeKind, data: &TemplateData<'_>) -> Option<(String, String)> {
        self.get(kind).map(|template| {
            (
                substitute(&template.subject, data),
                substitute(&template.body, data),
            )
        })
    }
}
