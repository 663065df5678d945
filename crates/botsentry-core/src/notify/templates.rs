//! Email and page templates
//!
//! Templates are compiled into the binary. Names ending in `.html` are
//! auto-escaped by minijinja.

use super::sender::EmailContent;
use minijinja::{Environment, Error as MiniJinjaError};
use serde::Serialize;

/// Template manager
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Create a new template manager
    pub fn new() -> Self {
        let mut env = Environment::new();

        env.add_template("owner_notice.html", include_str!("../../templates/owner_notice.html"))
            .expect("Failed to add owner_notice.html template");
        env.add_template("owner_notice.txt", include_str!("../../templates/owner_notice.txt"))
            .expect("Failed to add owner_notice.txt template");
        env.add_template("admin_summary.html", include_str!("../../templates/admin_summary.html"))
            .expect("Failed to add admin_summary.html template");
        env.add_template("admin_summary.txt", include_str!("../../templates/admin_summary.txt"))
            .expect("Failed to add admin_summary.txt template");
        env.add_template("bulk_alert.html", include_str!("../../templates/bulk_alert.html"))
            .expect("Failed to add bulk_alert.html template");
        env.add_template("bulk_alert.txt", include_str!("../../templates/bulk_alert.txt"))
            .expect("Failed to add bulk_alert.txt template");
        env.add_template("approval_result.html", include_str!("../../templates/approval_result.html"))
            .expect("Failed to add approval_result.html template");

        Self { env }
    }

    /// Render a single template
    pub fn render<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String, MiniJinjaError> {
        self.env.get_template(name)?.render(ctx)
    }

    /// Render the HTML and text variants of an email
    pub fn render_email<S: Serialize>(
        &self,
        base_name: &str,
        subject: String,
        ctx: &S,
    ) -> Result<EmailContent, MiniJinjaError> {
        Ok(EmailContent {
            subject,
            html: self.render(&format!("{}.html", base_name), ctx)?,
            text: self.render(&format!("{}.txt", base_name), ctx)?,
        })
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_html_is_escaped() {
        let templates = Templates::new();
        let html = templates
            .render(
                "approval_result.html",
                &json!({"title": "Done", "message": "<script>alert(1)</script>"}),
            )
            .unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_text_is_not_escaped() {
        let templates = Templates::new();
        let email = templates
            .render_email(
                "owner_notice",
                "Subject".to_string(),
                &json!({
                    "headline": "Bot flagged",
                    "bot_name": "Acme & Co",
                    "bot_address": "acme@bots.example",
                    "explanation": "x",
                    "previous_status": "normal",
                    "new_status": "flagged",
                    "reason": "y",
                    "action": "z",
                    "support_url": "https://example.com/support"
                }),
            )
            .unwrap();
        assert!(email.text.contains("Acme & Co"));
        assert!(email.html.contains("Acme &amp; Co"));
    }
}
