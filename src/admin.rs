use crate::footer::splice_footer;
use crate::hooks::{ActionLink, ActionLinkDecorator, SettingsPanel};
use crate::options::{OPTION_GROUP, Sanitizer, fields_for_group};
use crate::resolve::OptionResolver;
use crate::roles::RoleTable;
use crate::server::{AppState, request_context};
use crate::session::{Viewer, make_session_cookie};
use crate::store::{SettingsStore, StoreError};
use async_trait::async_trait;
use axum::Json;
use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Slug of the analytics settings page.
pub const PAGE_SLUG: &str = "google-analytics";

/// The analytics settings page: a tracking-ID text input plus one checkbox
/// per opt-out, submitting as `wga[<key>]` fields.
pub struct AnalyticsSettingsPanel {
    store: Arc<dyn SettingsStore>,
    roles: Arc<dyn RoleTable>,
    sanitizer: Arc<dyn Sanitizer>,
}

impl AnalyticsSettingsPanel {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        roles: Arc<dyn RoleTable>,
        sanitizer: Arc<dyn Sanitizer>,
    ) -> Self {
        Self {
            store,
            roles,
            sanitizer,
        }
    }

    fn checkbox(resolver: &OptionResolver<'_>, id: &str, label: &str) -> String {
        let checked = if resolver.resolve(id).as_deref() == Some("true") {
            " checked"
        } else {
            ""
        };
        format!(
            "<label for=\"wga_{id}\"><input id=\"wga_{id}\" type=\"checkbox\" \
             name=\"wga[{id}]\" value=\"true\"{checked} />&nbsp;&nbsp;{label}</label><br />\n"
        )
    }
}

#[async_trait]
impl SettingsPanel for AnalyticsSettingsPanel {
    async fn render(&self, saved: bool) -> Result<String, StoreError> {
        let record = self.store.get(OPTION_GROUP).await?;
        let resolver = OptionResolver::new(record.as_ref(), self.roles.as_ref());

        let mut html = String::new();
        html.push_str("<div class=\"wrap\">\n<h2>Google Analytics Options</h2>\n");
        if saved {
            html.push_str("<p class=\"notice\">Options saved.</p>\n");
        }
        html.push_str(&format!(
            "<form action=\"/admin/settings/{PAGE_SLUG}\" method=\"post\" id=\"wp_google_analytics\">\n"
        ));
        html.push_str("<table class=\"form-table\">\n");

        html.push_str("<tr><th>Google Analytics 4 tracking ID:</th><td>\n");
        html.push_str(&format!(
            "<input name=\"wga[code]\" id=\"wga-code\" type=\"text\" value=\"{}\" />\n",
            html_escape(&resolver.tracking_id())
        ));
        html.push_str(
            "<p class=\"description\">Paste your Google Analytics 4 tracking ID \
             (e.g. &quot;G-XXXXXXXXXX&quot;) into the field.</p>\n</td></tr>\n",
        );

        html.push_str("<tr><th>Visits to ignore:</th><td>\n");
        html.push_str(&Self::checkbox(
            &resolver,
            "ignore_admin_area",
            "Do not log anything in the admin area",
        ));
        for role in self.roles.roles() {
            let label = format!(
                "Do not log {} when logged in",
                html_escape(role.name.trim_end_matches('s'))
            );
            let id = format!("ignore_role_{}", role.id);
            html.push_str(&Self::checkbox(&resolver, &id, &label));
        }
        html.push_str("</td></tr>\n</table>\n");

        html.push_str(
            "<p class=\"submit\"><input type=\"submit\" value=\"Update Options\" /></p>\n</form>\n</div>\n",
        );
        Ok(html)
    }

    async fn submit(&self, form: &HashMap<String, String>) -> Result<(), StoreError> {
        let raw = fields_for_group(form, OPTION_GROUP);
        self.store
            .set(OPTION_GROUP, &raw, self.sanitizer.as_ref())
            .await?;
        Ok(())
    }
}

/// Prepends the `Settings` link to the analytics row on the admin index.
pub struct AnalyticsActionLinks;

impl ActionLinkDecorator for AnalyticsActionLinks {
    fn decorate(&self, slug: &str, mut links: Vec<ActionLink>) -> Vec<ActionLink> {
        if slug == PAGE_SLUG {
            links.insert(
                0,
                ActionLink {
                    label: "Settings".to_string(),
                    href: format!("/admin/settings/{PAGE_SLUG}"),
                },
            );
        }
        links
    }
}

pub async fn admin_index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut body = String::from("<div class=\"wrap\">\n<h2>Settings</h2>\n<ul>\n");
    for page in state.hooks.admin_pages() {
        body.push_str(&format!(
            "<li><a href=\"/admin/settings/{}\">{}</a>",
            page.slug,
            html_escape(&page.menu_label)
        ));
        for link in state.hooks.action_links(&page.slug) {
            body.push_str(&format!(
                " | <a href=\"{}\">{}</a>",
                link.href,
                html_escape(&link.label)
            ));
        }
        body.push_str("</li>\n");
    }
    body.push_str("</ul>\n</div>\n");

    let ctx = request_context(&state, &headers, true).await;
    render_admin_page(&state, "Settings", &body, &ctx).await
}

#[derive(Debug, Deserialize)]
pub struct SavedQuery {
    #[serde(default)]
    saved: Option<String>,
}

pub async fn settings_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<SavedQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(page) = state.hooks.admin_page(&slug) else {
        return (StatusCode::NOT_FOUND, "unknown settings page").into_response();
    };
    let body = match page.panel.render(query.saved.is_some()).await {
        Ok(html) => html,
        Err(err) => return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    };
    let ctx = request_context(&state, &headers, true).await;
    render_admin_page(&state, &page.title, &body, &ctx).await
}

pub async fn settings_submit(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let Some(page) = state.hooks.admin_page(&slug) else {
        return (StatusCode::NOT_FOUND, "unknown settings page").into_response();
    };
    match page.panel.submit(&form).await {
        Ok(()) => Redirect::to(&format!("/admin/settings/{slug}?saved=1")).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionIssueRequest {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

pub async fn issue_session(
    State(state): State<AppState>,
    Json(body): Json<SessionIssueRequest>,
) -> Response {
    let viewer = Viewer {
        user_id: body.user_id,
        roles: body.roles,
    };
    match state.sessions.issue(viewer.clone()).await {
        Ok(token) => (
            StatusCode::CREATED,
            [(header::SET_COOKIE, make_session_cookie(&token))],
            Json(serde_json::json!({
                "token": token,
                "user_id": viewer.user_id,
                "roles": viewer.roles,
            })),
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// Admin pages go through a minimal shell and dispatch the footer hooks with
/// an admin-area context, so admin renders carry the same diagnostics the
/// site footer does.
async fn render_admin_page(
    state: &AppState,
    title: &str,
    body: &str,
    ctx: &crate::footer::RequestContext,
) -> Response {
    let shell = format!(
        "<!doctype html>\n<html>\n<head><title>{}</title></head>\n<body>\n{}</body>\n</html>\n",
        html_escape(title),
        body
    );
    let footer = state.hooks.render_footers(ctx).await;
    match splice_footer(&shell, &footer) {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            warn!(?err, "footer splice failed; appending to page end");
            Html(format!("{shell}{footer}")).into_response()
        }
    }
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionSanitizer;
    use crate::roles::StaticRoleTable;
    use crate::store::MemoryStore;

    fn panel() -> (AnalyticsSettingsPanel, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let roles: Arc<dyn RoleTable> = Arc::new(StaticRoleTable::builtin());
        let sanitizer = Arc::new(OptionSanitizer::new(roles.clone()));
        (
            AnalyticsSettingsPanel::new(store.clone(), roles, sanitizer),
            store,
        )
    }

    #[tokio::test]
    async fn form_renders_the_expected_fields() {
        let (panel, _store) = panel();
        let html = panel.render(false).await.unwrap();
        assert!(html.contains("Google Analytics Options"));
        assert!(html.contains("name=\"wga[code]\""));
        assert!(html.contains("name=\"wga[ignore_admin_area]\""));
        assert!(html.contains("Do not log anything in the admin area"));
        // Role display names lose their trailing plural `s` in the label.
        assert!(html.contains("Do not log Editor when logged in"));
        assert!(html.contains("name=\"wga[ignore_role_editor]\""));
        assert!(html.contains("value=\"Update Options\""));
        assert!(!html.contains("Options saved."));
    }

    #[tokio::test]
    async fn submit_then_render_shows_the_stored_state() {
        let (panel, store) = panel();
        let form: HashMap<String, String> = [
            ("wga[code]".to_string(), "G-ABCD123456".to_string()),
            ("wga[ignore_role_editor]".to_string(), "true".to_string()),
            ("unrelated".to_string(), "ignored".to_string()),
        ]
        .into_iter()
        .collect();
        panel.submit(&form).await.unwrap();

        let record = store.get(OPTION_GROUP).await.unwrap().unwrap();
        assert_eq!(record["code"], "G-ABCD123456");
        assert_eq!(record["ignore_role_editor"], "true");
        assert_eq!(record["ignore_admin_area"], "false");
        assert!(!record.contains_key("unrelated"));

        let html = panel.render(true).await.unwrap();
        assert!(html.contains("value=\"G-ABCD123456\""));
        assert!(html.contains("name=\"wga[ignore_role_editor]\" value=\"true\" checked"));
        assert!(html.contains("Options saved."));
    }

    #[test]
    fn action_links_prepend_settings_for_the_analytics_page_only() {
        let links = AnalyticsActionLinks.decorate(PAGE_SLUG, vec![]);
        assert_eq!(links[0].label, "Settings");
        assert_eq!(links[0].href, "/admin/settings/google-analytics");
        assert!(AnalyticsActionLinks.decorate("other", vec![]).is_empty());
    }
}
