use clap::{Args, Subcommand, ValueEnum};
use quire::{
    ids::OrderId,
    reconcile::{OrderQuery, OrderSort, OrderWithPayment},
};
use quire_app::{
    config::PollingConfig,
    context::AppContext,
    orders::{Dashboard, OrderDesk},
};

use super::{ScopeArgs, StatusArg};

#[derive(Debug, Args)]
pub(crate) struct OrdersCommand {
    #[command(subcommand)]
    command: OrdersSubcommand,
}

#[derive(Debug, Subcommand)]
enum OrdersSubcommand {
    /// List orders with their payments
    List(ListOrdersArgs),

    /// Move an order to another status
    Move(MoveOrderArgs),

    /// Record that a delivered order's cash on delivery was collected
    ConfirmCod(ConfirmCodArgs),

    /// Print per-status counts, spend and orders needing attention
    Dashboard(ScopeArgs),

    /// Poll the order list and print the dashboard after every refresh
    Watch(ScopeArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Newest,
    Oldest,
    PriceHighToLow,
    PriceLowToHigh,
}

impl From<SortArg> for OrderSort {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Newest => Self::Newest,
            SortArg::Oldest => Self::Oldest,
            SortArg::PriceHighToLow => Self::PriceHighToLow,
            SortArg::PriceLowToHigh => Self::PriceLowToHigh,
        }
    }
}

#[derive(Debug, Args)]
struct ListOrdersArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Only orders with this status
    #[arg(long, value_enum)]
    status: Option<StatusArg>,

    /// Match an order id or book title
    #[arg(long)]
    search: Option<String>,

    /// Sort order
    #[arg(long, value_enum, default_value_t = SortArg::Newest)]
    sort: SortArg,
}

#[derive(Debug, Args)]
struct MoveOrderArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Order id
    #[arg(long)]
    order: u64,

    /// Target status
    #[arg(long, value_enum)]
    to: StatusArg,
}

#[derive(Debug, Args)]
struct ConfirmCodArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Order id
    #[arg(long)]
    order: u64,
}

pub(crate) async fn run(
    command: OrdersCommand,
    context: AppContext,
    polling: &PollingConfig,
) -> Result<(), String> {
    match command.command {
        OrdersSubcommand::List(args) => {
            let desk = OrderDesk::new(context, args.scope.scope());
            refresh(&desk).await?;

            let found = desk.query(&OrderQuery {
                status: args.status.map(Into::into),
                search: args.search,
                sort: args.sort.into(),
            });

            if found.is_empty() {
                println!("no orders found");
            }

            for entry in &found {
                print_order(entry);
            }
        }
        OrdersSubcommand::Move(args) => {
            let desk = OrderDesk::new(context, args.scope.scope());
            let updated = desk
                .transition(OrderId::new(args.order), args.to.into())
                .await
                .map_err(|error| format!("failed to move order {}: {error}", args.order))?;

            println!("order {} is now {}", updated.id, updated.status);
        }
        OrdersSubcommand::ConfirmCod(args) => {
            let desk = OrderDesk::new(context, args.scope.scope());
            let outcome = desk
                .confirm_cod(OrderId::new(args.order))
                .await
                .map_err(|error| format!("failed to confirm payment: {error}"))?;

            println!("order {}: {outcome:?}", args.order);
        }
        OrdersSubcommand::Dashboard(scope) => {
            let now = context.clock.now();
            let desk = OrderDesk::new(context, scope.scope());
            refresh(&desk).await?;

            let dashboard = desk
                .dashboard(now)
                .map_err(|error| format!("failed to summarise orders: {error}"))?;

            print_dashboard(&dashboard);
        }
        OrdersSubcommand::Watch(scope) => {
            let clock = context.clock.clone();
            let desk = OrderDesk::new(context, scope.scope());

            let shutdown = async {
                let _signal = tokio::signal::ctrl_c().await;
            };

            desk.poll(polling.interval(), shutdown, |_orders| {
                match desk.dashboard(clock.now()) {
                    Ok(dashboard) => print_dashboard(&dashboard),
                    Err(error) => eprintln!("failed to summarise orders: {error}"),
                }
            })
            .await;
        }
    }

    Ok(())
}

async fn refresh(desk: &OrderDesk) -> Result<(), String> {
    desk.refresh()
        .await
        .map(|_count| ())
        .map_err(|error| format!("failed to load orders: {error}"))
}

fn print_order(entry: &OrderWithPayment) {
    let order = &entry.order;

    println!("order_id: {}", order.id);
    println!("customer_id: {}", order.customer);
    println!("status: {}", order.status);
    println!("ordered_at: {}", order.ordered_at);
    println!("total_price: {}", order.total_price);

    for line in &order.lines {
        println!(
            "  book {}: {} x{} = {} ({})",
            line.book,
            line.title,
            line.quantity.get(),
            line.total,
            line.store_name
        );
    }

    for line in order.feedback_lines() {
        println!("  feedback open for book {}", line.book);
    }

    match &entry.payment {
        Some(payment) => println!("payment: {} {}", payment.method, payment.status),
        None => println!("payment: none"),
    }

    println!();
}

fn print_dashboard(dashboard: &Dashboard) {
    let counts = &dashboard.counts;

    println!(
        "all: {}  pending: {}  confirmed: {}  shipping: {}  delivered: {}  cancelled: {}",
        counts.all(),
        counts.pending,
        counts.confirmed,
        counts.shipping,
        counts.delivered,
        counts.cancelled
    );
    println!("spend: {}", dashboard.spend);

    if let Some(revenue) = &dashboard.revenue {
        println!("revenue: {revenue}");
    }

    for entry in &dashboard.awaiting_cod {
        println!("awaiting cod confirmation: order {}", entry.order.id);
    }

    for entry in &dashboard.stale_pending {
        println!("pending over 24h: order {}", entry.order.id);
    }
}
