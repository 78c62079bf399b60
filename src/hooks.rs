use crate::footer::RequestContext;
use crate::store::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Renders one block of footer markup for the current request.
#[async_trait]
pub trait FooterHook: Send + Sync {
    async fn render(&self, ctx: &RequestContext) -> String;
}

/// One settings page on the admin surface.
#[async_trait]
pub trait SettingsPanel: Send + Sync {
    async fn render(&self, saved: bool) -> Result<String, StoreError>;
    async fn submit(&self, form: &HashMap<String, String>) -> Result<(), StoreError>;
}

pub struct AdminPage {
    pub slug: String,
    pub title: String,
    pub menu_label: String,
    pub panel: Arc<dyn SettingsPanel>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLink {
    pub label: String,
    pub href: String,
}

/// May prepend links for a settings page's row on the admin index.
pub trait ActionLinkDecorator: Send + Sync {
    fn decorate(&self, slug: &str, links: Vec<ActionLink>) -> Vec<ActionLink>;
}

/// Typed registries for the lifecycle surfaces: footer rendering, admin
/// settings pages, and action links. Populated once at startup, then frozen
/// behind an `Arc` in the application state.
#[derive(Default)]
pub struct HookRegistry {
    footers: Vec<Arc<dyn FooterHook>>,
    admin_pages: Vec<AdminPage>,
    action_links: Vec<Arc<dyn ActionLinkDecorator>>,
}

impl HookRegistry {
    pub fn register_footer(&mut self, hook: Arc<dyn FooterHook>) {
        self.footers.push(hook);
    }

    /// Dispatches every footer hook in registration order and concatenates
    /// the rendered blocks.
    pub async fn render_footers(&self, ctx: &RequestContext) -> String {
        let mut out = String::new();
        for hook in &self.footers {
            out.push_str(&hook.render(ctx).await);
        }
        out
    }

    pub fn register_admin_page(&mut self, page: AdminPage) {
        self.admin_pages.push(page);
    }

    pub fn admin_pages(&self) -> &[AdminPage] {
        &self.admin_pages
    }

    pub fn admin_page(&self, slug: &str) -> Option<&AdminPage> {
        self.admin_pages.iter().find(|page| page.slug == slug)
    }

    pub fn register_action_links(&mut self, decorator: Arc<dyn ActionLinkDecorator>) {
        self.action_links.push(decorator);
    }

    pub fn action_links(&self, slug: &str) -> Vec<ActionLink> {
        let mut links = Vec::new();
        for decorator in &self.action_links {
            links = decorator.decorate(slug, links);
        }
        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticFooter(&'static str);

    #[async_trait]
    impl FooterHook for StaticFooter {
        async fn render(&self, _ctx: &RequestContext) -> String {
            self.0.to_string()
        }
    }

    struct PrependLink;

    impl ActionLinkDecorator for PrependLink {
        fn decorate(&self, slug: &str, mut links: Vec<ActionLink>) -> Vec<ActionLink> {
            if slug == "analytics" {
                links.insert(
                    0,
                    ActionLink {
                        label: "Settings".into(),
                        href: "/admin/settings/analytics".into(),
                    },
                );
            }
            links
        }
    }

    #[tokio::test]
    async fn footers_render_in_registration_order() {
        let mut hooks = HookRegistry::default();
        hooks.register_footer(Arc::new(StaticFooter("<!-- one -->")));
        hooks.register_footer(Arc::new(StaticFooter("<!-- two -->")));
        let out = hooks.render_footers(&RequestContext::default()).await;
        assert_eq!(out, "<!-- one --><!-- two -->");
    }

    #[test]
    fn decorators_only_touch_their_own_page() {
        let mut hooks = HookRegistry::default();
        hooks.register_action_links(Arc::new(PrependLink));
        let links = hooks.action_links("analytics");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].label, "Settings");
        assert!(hooks.action_links("other").is_empty());
    }
}
