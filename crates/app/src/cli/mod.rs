use clap::{Args, Parser, Subcommand, ValueEnum};
use quire::{
    cart::Cart,
    ids::{CustomerId, SellerId},
    orders::{OrderStatus, PaymentMethod},
};
use quire_app::{
    config::{BackendConfig, EngineConfig},
    context::AppContext,
    http::{HttpBackend, HttpConfig},
    observability,
    orders::DeskScope,
};

mod cart;
mod checkout;
mod orders;
mod vouchers;

#[derive(Debug, Parser)]
#[command(name = "quire", about = "Quire storefront cart and order engine", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    config: EngineConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Cart(cart::CartCommand),
    Vouchers(vouchers::VouchersCommand),
    Checkout(checkout::CheckoutArgs),
    Orders(orders::OrdersCommand),
}

impl Cli {
    /// Parse flags after loading `.env`, so the environment can supply defaults.
    pub(crate) fn load() -> Self {
        let _env = dotenvy::dotenv();

        Self::parse()
    }

    pub(crate) async fn run(self) -> Result<(), String> {
        observability::init(&self.config.logging)
            .map_err(|error| format!("failed to initialise logging: {error}"))?;

        let context = connect(&self.config.backend)?;

        match self.command {
            Commands::Cart(command) => cart::run(command, context).await,
            Commands::Vouchers(command) => vouchers::run(command, context).await,
            Commands::Checkout(args) => checkout::run(args, context).await,
            Commands::Orders(command) => orders::run(command, context, &self.config.polling).await,
        }
    }
}

fn connect(config: &BackendConfig) -> Result<AppContext, String> {
    let config = HttpConfig::from_backend_config(config)
        .map_err(|error| format!("invalid backend configuration: {error}"))?;
    let backend = HttpBackend::new(config)
        .map_err(|error| format!("failed to build http client: {error}"))?;

    Ok(AppContext::from_http(backend))
}

/// Which orders a command acts on; neither flag means the whole store as admin.
#[derive(Debug, Args)]
pub(crate) struct ScopeArgs {
    /// Act as this customer
    #[arg(long, conflicts_with = "seller")]
    customer: Option<u64>,

    /// Act as this seller
    #[arg(long)]
    seller: Option<u64>,
}

impl ScopeArgs {
    pub(crate) fn scope(&self) -> DeskScope {
        match (self.customer, self.seller) {
            (Some(customer), _) => DeskScope::Customer(CustomerId::new(customer)),
            (None, Some(seller)) => DeskScope::Seller(SellerId::new(seller)),
            (None, None) => DeskScope::All,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum MethodArg {
    Cod,
    Momo,
    Vnpay,
}

impl From<MethodArg> for PaymentMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Cod => Self::Cod,
            MethodArg::Momo => Self::Momo,
            MethodArg::Vnpay => Self::VnPay,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum StatusArg {
    Pending,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

impl From<StatusArg> for OrderStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Pending => Self::Pending,
            StatusArg::Confirmed => Self::Confirmed,
            StatusArg::Shipping => Self::Shipping,
            StatusArg::Delivered => Self::Delivered,
            StatusArg::Cancelled => Self::Cancelled,
        }
    }
}

pub(crate) fn print_cart(cart: &Cart) {
    if cart.is_empty() {
        println!("cart is empty");
        return;
    }

    for group in cart.group_by_seller() {
        println!("{} (seller {})", group.store_name, group.seller);

        for line in &group.lines {
            let mark = if cart.selection().contains(line.book) {
                "[x]"
            } else {
                "[ ]"
            };

            println!(
                "  {mark} book {}: {} x{} @ {}",
                line.book,
                line.display_name,
                line.quantity.get(),
                line.unit_price
            );
        }
    }
}
