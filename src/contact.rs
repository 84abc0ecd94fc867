// Copyright (c) 2026 rezky_nightky

use std::time::Duration;

use thiserror::Error;

use crate::throttle::{RateLimit, Throttle};

/// 3 submissions per 15 minutes per client address.
pub const CONTACT_LIMIT: u32 = 3;
pub const CONTACT_WINDOW: Duration = Duration::from_secs(15 * 60);

pub const ENV_MAIL_TOKEN: &str = "MAIL_API_KEY";

const MAIL_API_BASE: &str = "https://api.resend.com";
const MAIL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        if self.email.trim().is_empty() {
            return Err("email is required".to_string());
        }
        if !plausible_email(self.email.trim()) {
            return Err("invalid email format".to_string());
        }
        if self.subject.trim().is_empty() {
            return Err("subject is required".to_string());
        }
        if self.message.trim().is_empty() {
            return Err("message is required".to_string());
        }
        if self.name.trim().chars().count() < 2 {
            return Err("name must be at least 2 characters".to_string());
        }
        if self.subject.trim().chars().count() < 5 {
            return Err("subject must be at least 5 characters".to_string());
        }
        if self.message.trim().chars().count() < 10 {
            return Err("message must be at least 10 characters".to_string());
        }
        Ok(())
    }
}

/// Shape check only: one `@`, a dot in the domain, no whitespace.
fn plausible_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((head, tail)) => !head.is_empty() && !tail.is_empty(),
        None => false,
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail api http error ({status:?}): {message}")]
    Http {
        status: Option<u16>,
        message: String,
    },
    #[error("malformed mail api reply: {0}")]
    Malformed(String),
}

/// Outbound transactional-email collaborator. Opaque to this crate:
/// success hands back a message id, failure is reported upward, never
/// retried here.
pub trait Mailer: Send + Sync {
    fn send(&self, request: &ContactRequest) -> Result<String, MailError>;

    fn name(&self) -> &'static str;
}

/// REST mailer (Resend-style `POST /emails` with bearer auth).
pub struct RestMailer {
    base_url: String,
    token: String,
    from: String,
    to: String,
    client: reqwest::blocking::Client,
}

impl RestMailer {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<Self, MailError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(MAIL_TIMEOUT)
            .timeout(MAIL_TIMEOUT)
            .build()
            .map_err(|error| MailError::Http {
                status: None,
                message: error.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            from: from.into(),
            to: to.into(),
            client,
        })
    }

    /// Builds against the hosted mail API with the key from
    /// `MAIL_API_KEY`. Returns `None` when the key is missing or empty.
    pub fn from_env(from: impl Into<String>, to: impl Into<String>) -> Option<Self> {
        let token = std::env::var(ENV_MAIL_TOKEN).ok()?;
        if token.trim().is_empty() {
            return None;
        }
        Self::new(MAIL_API_BASE, token, from, to).ok()
    }
}

impl Mailer for RestMailer {
    fn send(&self, request: &ContactRequest) -> Result<String, MailError> {
        #[derive(serde::Serialize)]
        struct SendBody<'a> {
            from: &'a str,
            to: [&'a str; 1],
            subject: String,
            html: String,
            reply_to: &'a str,
        }

        #[derive(serde::Deserialize)]
        struct SendReply {
            id: String,
        }

        let body = SendBody {
            from: &self.from,
            to: [&self.to],
            subject: format!("Contact Form: {}", request.subject.trim()),
            html: render_html(request),
            reply_to: request.email.trim(),
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .map_err(|error| MailError::Http {
                status: None,
                message: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "unable to read mail api reply".to_string());
            return Err(MailError::Http {
                status: Some(status.as_u16()),
                message,
            });
        }

        let reply: SendReply = response
            .json()
            .map_err(|error| MailError::Malformed(error.to_string()))?;
        Ok(reply.id)
    }

    fn name(&self) -> &'static str {
        "mail-rest"
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_html(request: &ContactRequest) -> String {
    format!(
        "<div>\
         <h2>New Contact Form Submission</h2>\
         <p><strong>{}</strong> &lt;{}&gt;</p>\
         <p>{}</p>\
         <div style=\"white-space: pre-wrap;\">{}</div>\
         </div>",
        escape_html(request.name.trim()),
        escape_html(request.email.trim()),
        escape_html(request.subject.trim()),
        escape_html(&request.message),
    )
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("too many requests, retry after reset")]
    RateLimited {
        limit: u32,
        remaining: u32,
        reset_at_ms: u64,
    },
    #[error("invalid submission: {0}")]
    Invalid(String),
    #[error("mail dispatch failed: {0}")]
    Dispatch(#[from] MailError),
}

#[derive(Debug)]
pub struct Submission {
    pub message_id: String,
    pub rate: RateLimit,
}

/// Full contact-form flow: throttle by client address first, then
/// validate, then dispatch.
pub fn submit(
    form: &ContactRequest,
    client_ip: &str,
    throttle: &Throttle,
    mailer: &dyn Mailer,
) -> Result<Submission, SubmitError> {
    let rate = throttle.check(&format!("contact-{client_ip}"), CONTACT_LIMIT, CONTACT_WINDOW);
    if !rate.admitted {
        return Err(SubmitError::RateLimited {
            limit: rate.limit,
            remaining: rate.remaining,
            reset_at_ms: rate.reset_at_ms,
        });
    }

    form.validate().map_err(SubmitError::Invalid)?;

    let message_id = mailer.send(form)?;
    Ok(Submission {
        message_id,
        rate,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::throttle::Throttle;

    struct MockMailer {
        sent: AtomicUsize,
        fail: bool,
    }

    impl MockMailer {
        fn new(fail: bool) -> Self {
            Self {
                sent: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl Mailer for MockMailer {
        fn send(&self, _request: &ContactRequest) -> Result<String, MailError> {
            if self.fail {
                return Err(MailError::Http {
                    status: Some(500),
                    message: "upstream down".to_string(),
                });
            }
            let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("msg-{n}"))
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    fn valid_form() -> ContactRequest {
        ContactRequest {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            subject: "About the engine".to_string(),
            message: "I have a question about your analytical engine.".to_string(),
        }
    }

    #[test]
    fn plausible_email_shapes() {
        assert!(plausible_email("a@b.c"));
        assert!(plausible_email("first.last@sub.domain.io"));
        assert!(!plausible_email("no-at.example.com"));
        assert!(!plausible_email("two@@b.c"));
        assert!(!plausible_email("a@nodot"));
        assert!(!plausible_email("a@.c"));
        assert!(!plausible_email("a b@c.d"));
    }

    #[test]
    fn validate_rejects_short_fields() {
        let mut f = valid_form();
        f.name = "A".to_string();
        assert!(f.validate().is_err());

        let mut f = valid_form();
        f.subject = "hey".to_string();
        assert!(f.validate().is_err());

        let mut f = valid_form();
        f.message = "too short".to_string();
        assert!(f.validate().is_err());

        assert!(valid_form().validate().is_ok());
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html("<b>&\"'</b>"),
            "&lt;b&gt;&amp;&quot;&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn submit_dispatches_and_reports_quota() {
        let throttle = Throttle::local_only();
        let mailer = MockMailer::new(false);
        let s = submit(&valid_form(), "203.0.113.7", &throttle, &mailer).unwrap();
        assert_eq!(s.message_id, "msg-1");
        assert_eq!(s.rate.remaining, CONTACT_LIMIT - 1);
    }

    #[test]
    fn fourth_submission_is_rate_limited() {
        let throttle = Throttle::local_only();
        let mailer = MockMailer::new(false);
        for _ in 0..3 {
            submit(&valid_form(), "203.0.113.8", &throttle, &mailer).unwrap();
        }
        match submit(&valid_form(), "203.0.113.8", &throttle, &mailer) {
            Err(SubmitError::RateLimited { remaining, .. }) => assert_eq!(remaining, 0),
            other => panic!("expected rate limit, got {other:?}"),
        }
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn invalid_form_never_reaches_the_mailer() {
        let throttle = Throttle::local_only();
        let mailer = MockMailer::new(false);
        let mut f = valid_form();
        f.email = "not-an-email".to_string();
        assert!(matches!(
            submit(&f, "203.0.113.9", &throttle, &mailer),
            Err(SubmitError::Invalid(_))
        ));
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispatch_failure_surfaces_as_rejection() {
        let throttle = Throttle::local_only();
        let mailer = MockMailer::new(true);
        assert!(matches!(
            submit(&valid_form(), "203.0.113.10", &throttle, &mailer),
            Err(SubmitError::Dispatch(_))
        ));
    }
}
