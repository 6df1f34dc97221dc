//! Template for new extensions. Registered but never discovered.
//!
//! Copy this file, rename `NAME` to match the unit's locator, and fill in
//! the hooks. Drop `with_on_admin_login` if the module only needs a
//! standard session.

use crate::context::{Context, LoginEvent};
use crate::plugin::{
    ExtensionCategory, ExtensionDeclaration, ExtensionFactory, ExtensionModule, ModuleOptions,
};
use async_trait::async_trait;
use nexec_foundation::Result;

pub const NAME: &str = "example_module";

pub struct ExampleFactory;

impl ExtensionFactory for ExampleFactory {
    fn declaration(&self) -> ExtensionDeclaration {
        ExtensionDeclaration::new(NAME)
            .description("Example module")
            .category(ExtensionCategory::Enumeration)
            .supports(["tcp"])
            .options_doc("ACTION    Free-form value echoed on login")
            .with_options()
            .with_on_login()
            .with_on_admin_login()
    }

    fn instantiate(&self) -> Result<Box<dyn ExtensionModule>> {
        Ok(Box::new(ExampleModule::default()))
    }
}

#[derive(Debug, Default)]
pub struct ExampleModule {
    action: Option<String>,
}

#[async_trait]
impl ExtensionModule for ExampleModule {
    fn options(&mut self, _ctx: &Context, options: &ModuleOptions) -> Result<()> {
        self.action = options.get("ACTION").cloned();
        Ok(())
    }

    async fn on_login(&self, ctx: &Context, event: &LoginEvent<'_>) -> Result<()> {
        ctx.log().info(format!(
            "Login on {} (action: {})",
            event.target,
            self.action.as_deref().unwrap_or("none")
        ));
        Ok(())
    }

    async fn on_admin_login(&self, ctx: &Context, event: &LoginEvent<'_>) -> Result<()> {
        ctx.log().success(format!("Admin login on {}", event.target));
        Ok(())
    }
}
