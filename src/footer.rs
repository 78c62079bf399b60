use crate::options::OPTION_GROUP;
use crate::resolve::OptionResolver;
use crate::roles::RoleTable;
use crate::store::SettingsStore;
use async_trait::async_trait;
use kuchiki::traits::*;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// What the footer decision needs to know about the current request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub authenticated: bool,
    /// The viewer's effective role (first role when they hold several).
    pub role: Option<String>,
    pub admin_area: bool,
}

/// Whether opt-out hits suppress the snippet or only annotate it.
///
/// `Annotate` reproduces the historical behavior: the snippet is always
/// emitted and opt-out hits only leave a diagnostic comment. `Enforce` makes
/// role and admin-area opt-outs actually drop the snippet. A missing tracking
/// ID never suppresses under either policy; the skeleton with an empty ID is
/// emitted alongside its diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitPolicy {
    #[default]
    Annotate,
    Enforce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FooterNote {
    MissingTrackingId,
    IgnoredRole,
    IgnoredAdminArea,
}

impl FooterNote {
    pub fn comment(&self) -> &'static str {
        match self {
            FooterNote::MissingTrackingId => {
                "<!-- Your Google Analytics Plugin is missing the tracking ID -->"
            }
            FooterNote::IgnoredRole => {
                "<!-- Google Analytics Plugin is set to ignore your user role -->"
            }
            FooterNote::IgnoredAdminArea => {
                "<!-- Your Google Analytics Plugin is set to ignore Admin area -->"
            }
        }
    }

    fn suppresses(&self) -> bool {
        matches!(self, FooterNote::IgnoredRole | FooterNote::IgnoredAdminArea)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FooterDecision {
    pub tracking_id: String,
    pub notes: Vec<FooterNote>,
    pub emit_snippet: bool,
}

/// Computes the footer decision for one request. Pure: deterministic given
/// the resolver's record and the context, and every opt-out hit degrades to
/// a note instead of an error.
pub fn decide(
    resolver: &OptionResolver<'_>,
    ctx: &RequestContext,
    policy: EmitPolicy,
) -> FooterDecision {
    let tracking_id = resolver.tracking_id();
    let mut notes = Vec::new();

    if tracking_id.is_empty() {
        notes.push(FooterNote::MissingTrackingId);
    }
    if ctx.authenticated
        && let Some(role) = &ctx.role
        && resolver.ignores_role(role)
    {
        notes.push(FooterNote::IgnoredRole);
    }
    if ctx.admin_area && resolver.ignores_admin_area() {
        notes.push(FooterNote::IgnoredAdminArea);
    }

    let emit_snippet = match policy {
        EmitPolicy::Annotate => true,
        EmitPolicy::Enforce => !notes.iter().any(FooterNote::suppresses),
    };

    FooterDecision {
        tracking_id,
        notes,
        emit_snippet,
    }
}

/// Renders a decision: diagnostic comments first, then the GA4 bootstrap
/// snippet when the policy lets it through.
pub fn render_footer(decision: &FooterDecision) -> String {
    let mut out = String::new();
    for note in &decision.notes {
        out.push_str(note.comment());
        out.push('\n');
    }
    if decision.emit_snippet {
        out.push_str(&gtag_snippet(&decision.tracking_id));
    }
    out
}

fn gtag_snippet(tracking_id: &str) -> String {
    format!(
        "<!-- Google tag (gtag.js) -->\n\
         <script async src=\"https://www.googletagmanager.com/gtag/js?id={tracking_id}\"></script>\n\
         <script>\n\
           window.dataLayer = window.dataLayer || [];\n\
           function gtag() {{\n\
             dataLayer.push(arguments);\n\
           }}\n\
         \n\
           gtag('js', new Date());\n\
           gtag('config', '{tracking_id}');\n\
         </script>\n"
    )
}

/// Footer hook wired to the live settings store and role table.
pub struct FooterEmitter {
    store: Arc<dyn SettingsStore>,
    roles: Arc<dyn RoleTable>,
    policy: EmitPolicy,
}

impl FooterEmitter {
    pub fn new(store: Arc<dyn SettingsStore>, roles: Arc<dyn RoleTable>, policy: EmitPolicy) -> Self {
        Self {
            store,
            roles,
            policy,
        }
    }
}

#[async_trait]
impl crate::hooks::FooterHook for FooterEmitter {
    async fn render(&self, ctx: &RequestContext) -> String {
        // A failed read degrades to the absent-record path; the page render
        // must not fail over analytics.
        let record = match self.store.get(OPTION_GROUP).await {
            Ok(record) => record,
            Err(err) => {
                warn!(?err, "settings read failed; rendering footer without a record");
                None
            }
        };
        let resolver = OptionResolver::new(record.as_ref(), self.roles.as_ref());
        render_footer(&decide(&resolver, ctx, self.policy))
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("html manipulation failed: {0}")]
    Html(String),
}

/// Splices the rendered footer into a page immediately before `</body>`.
pub fn splice_footer(html: &str, footer_html: &str) -> Result<String, RenderError> {
    if footer_html.is_empty() {
        return Ok(html.to_string());
    }

    let document = kuchiki::parse_html().one(html);
    let body = document
        .select_first("body")
        .map_err(|_| RenderError::Html("page has no <body> element".to_string()))?;

    let wrapper_html = format!("<div id=\"__tagfoot_footer\">{footer_html}</div>");
    let fragment_doc = kuchiki::parse_html().one(wrapper_html);
    let wrapper = fragment_doc
        .select_first("#__tagfoot_footer")
        .map_err(|_| RenderError::Html("footer wrapper lookup failed".to_string()))?;

    let children: Vec<_> = wrapper.as_node().children().collect();
    for child in children {
        body.as_node().append(child);
    }

    Ok(document.to_string())
}
