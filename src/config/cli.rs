use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the patisserie admin console.
#[derive(Debug, Parser)]
#[command(
    name = "patisserie",
    version,
    about = "Admin console for the pastry shop catalog"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "PATISSERIE_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(flatten)]
    pub credentials: Credentials,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the hosted backend base URL.
    #[arg(long = "backend-url", value_name = "URL", global = true)]
    pub backend_url: Option<String>,

    /// Override the public (anon) API key sent with every request.
    #[arg(long = "backend-anon-key", value_name = "KEY", global = true)]
    pub backend_anon_key: Option<String>,

    /// Override the request timeout.
    #[arg(long = "backend-timeout-seconds", value_name = "SECONDS", global = true)]
    pub backend_timeout_seconds: Option<u64>,

    /// Override the storage bucket for product images.
    #[arg(long = "storage-bucket", value_name = "BUCKET", global = true)]
    pub storage_bucket: Option<String>,
}

/// Admin credentials. Commands that write require both.
#[derive(Debug, Args, Default, Clone)]
pub struct Credentials {
    #[arg(
        long = "email",
        env = "PATISSERIE_ADMIN_EMAIL",
        value_name = "EMAIL",
        global = true
    )]
    pub email: Option<String>,

    #[arg(
        long = "password",
        env = "PATISSERIE_ADMIN_PASSWORD",
        value_name = "PASSWORD",
        hide_env_values = true,
        global = true
    )]
    pub password: Option<String>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Manage products.
    #[command(subcommand)]
    Products(ProductCommand),
    /// Manage categories.
    #[command(subcommand)]
    Categories(CategoryCommand),
    /// Sign in with the supplied credentials and print the session. The
    /// session is not signed out at exit.
    Login,
    /// Print the session state without signing in.
    Session,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ProductCommand {
    /// List products with their category.
    List,
    /// Show one product.
    Show(IdArg),
    /// Delete one product.
    Delete(IdArg),
    /// Create a product, or update it when `--id` is given.
    Save(Box<ProductSaveArgs>),
}

#[derive(Debug, Subcommand, Clone)]
pub enum CategoryCommand {
    /// List categories.
    List,
    /// Show one category.
    Show(IdArg),
    /// Delete one category.
    Delete(IdArg),
    /// Create a category, or update it when `--id` is given.
    Save(CategorySaveArgs),
}

#[derive(Debug, Args, Clone)]
pub struct IdArg {
    /// Row identifier.
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Debug, Args, Clone, Default)]
pub struct ProductSaveArgs {
    /// Existing product to update. Unset fields keep their stored values.
    #[arg(long, value_name = "ID")]
    pub id: Option<String>,

    #[arg(long, value_name = "TEXT")]
    pub name: Option<String>,

    #[arg(long = "short-description", value_name = "TEXT")]
    pub short_description: Option<String>,

    #[arg(long = "long-description", value_name = "TEXT")]
    pub long_description: Option<String>,

    #[arg(long, value_name = "AMOUNT")]
    pub price: Option<f64>,

    #[arg(long = "category-id", value_name = "ID")]
    pub category_id: Option<String>,

    /// Ingredient line; repeat for several. Replaces stored ingredients.
    #[arg(long = "ingredient", value_name = "TEXT")]
    pub ingredients: Vec<String>,

    /// Serving as `SIZE=COUNT`, e.g. `22 cm=12`; repeat for several.
    #[arg(long = "serving", value_name = "SIZE=COUNT")]
    pub servings: Vec<String>,

    /// Mark the product as featured.
    #[arg(
        long,
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub featured: Option<bool>,

    /// Image file to upload; repeat for several.
    #[arg(long = "image", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub images: Vec<PathBuf>,

    /// Drop the stored images instead of keeping them next to new uploads.
    #[arg(long = "replace-images", action = clap::ArgAction::SetTrue)]
    pub replace_images: bool,
}

#[derive(Debug, Args, Clone, Default)]
pub struct CategorySaveArgs {
    /// Existing category to update.
    #[arg(long, value_name = "ID")]
    pub id: Option<String>,

    #[arg(long, value_name = "TEXT")]
    pub name: Option<String>,

    /// URL slug; derived from the name when omitted.
    #[arg(long, value_name = "SLUG")]
    pub slug: Option<String>,
}
