use clap::{Args, Subcommand};
use jiff::Timestamp;
use quire::{
    discounts::{Discount, DiscountCode, DiscountValue, NewDiscount},
    ids::{BookId, CustomerId, DiscountId},
};
use quire_app::{context::AppContext, session::CustomerSession};
use rust_decimal::Decimal;
use rusty_money::Money;

#[derive(Debug, Args)]
pub(crate) struct VouchersCommand {
    #[command(subcommand)]
    command: VouchersSubcommand,
}

#[derive(Debug, Subcommand)]
enum VouchersSubcommand {
    /// List every voucher
    List,

    /// List vouchers usable for a selection of the customer's cart
    Eligible(EligibleArgs),

    /// Create a voucher
    Create(CreateVoucherArgs),

    /// Delete a voucher
    Delete(DeleteVoucherArgs),
}

#[derive(Debug, Args)]
struct EligibleArgs {
    /// Customer id
    #[arg(long)]
    customer: u64,

    /// Books to select; every line when omitted
    #[arg(long = "book")]
    books: Vec<u64>,
}

#[derive(Debug, Args)]
struct CreateVoucherArgs {
    /// Voucher code
    #[arg(long)]
    code: String,

    /// Percentage off, in (0, 100]
    #[arg(long, conflicts_with = "amount", required_unless_present = "amount")]
    percent: Option<Decimal>,

    /// Fixed amount off, in minor units
    #[arg(long)]
    amount: Option<i64>,

    /// Smallest order value the voucher accepts, in minor units
    #[arg(long, default_value_t = 0)]
    min_order: i64,

    /// Expiry instant, e.g. 2025-12-31T23:59:59Z
    #[arg(long)]
    expires_at: Option<Timestamp>,

    /// Restrict the voucher to these books
    #[arg(long = "book")]
    books: Vec<u64>,
}

#[derive(Debug, Args)]
struct DeleteVoucherArgs {
    /// Voucher id
    #[arg(long)]
    id: u64,
}

pub(crate) async fn run(command: VouchersCommand, context: AppContext) -> Result<(), String> {
    match command.command {
        VouchersSubcommand::List => {
            let discounts = context
                .call(context.discounts.list_all())
                .await
                .map_err(|error| format!("failed to list vouchers: {error}"))?;

            print_vouchers(&discounts);
        }
        VouchersSubcommand::Eligible(args) => {
            let session = CustomerSession::open(context, CustomerId::new(args.customer))
                .await
                .map_err(|error| format!("failed to load cart: {error}"))?;

            select(&session, &args.books)?;

            let eligible = session
                .fetch_eligible()
                .await
                .map_err(|error| format!("failed to list eligible vouchers: {error}"))?;

            print_vouchers(&eligible);

            if let Some(best) = session
                .best_voucher()
                .map_err(|error| format!("failed to rank vouchers: {error}"))?
            {
                println!("best: {}", best.code());
            }
        }
        VouchersSubcommand::Create(args) => {
            let discount = new_discount(args, &context)?;
            let created = context
                .call(context.discounts.create(discount))
                .await
                .map_err(|error| format!("failed to create voucher: {error}"))?;

            print_vouchers(&[created]);
        }
        VouchersSubcommand::Delete(args) => {
            context
                .call(context.discounts.delete(DiscountId::new(args.id)))
                .await
                .map_err(|error| format!("failed to delete voucher: {error}"))?;

            println!("deleted voucher {}", args.id);
        }
    }

    Ok(())
}

/// Select `books` in the session's cart, or everything when empty.
pub(crate) fn select(session: &CustomerSession, books: &[u64]) -> Result<(), String> {
    if books.is_empty() {
        session.select_all();
        return Ok(());
    }

    for &book in books {
        session
            .toggle_selected(BookId::new(book))
            .map_err(|error| format!("failed to select book {book}: {error}"))?;
    }

    Ok(())
}

fn new_discount(args: CreateVoucherArgs, context: &AppContext) -> Result<NewDiscount, String> {
    let value = match (args.percent, args.amount) {
        (Some(points), _) => DiscountValue::percentage(points),
        (None, Some(amount)) => DiscountValue::amount(Money::from_minor(amount, context.currency)),
        (None, None) => return Err("either --percent or --amount is required".to_string()),
    }
    .map_err(|error| format!("invalid voucher value: {error}"))?;

    Ok(NewDiscount {
        id: DiscountId::new(0),
        code: DiscountCode::new(&args.code).map_err(|error| format!("invalid code: {error}"))?,
        value,
        min_order_value: Money::from_minor(args.min_order, context.currency),
        expires_at: args.expires_at,
        active: true,
        applicable_books: args.books.into_iter().map(BookId::new).collect(),
        used_by: Vec::new(),
    })
}

fn print_vouchers(discounts: &[Discount]) {
    if discounts.is_empty() {
        println!("no vouchers found");
        return;
    }

    for discount in discounts {
        let value = match discount.value() {
            DiscountValue::PercentageOff(_) => format!(
                "{}%",
                discount.value().percentage_points().unwrap_or_default()
            ),
            DiscountValue::AmountOff(amount) => amount.to_string(),
        };

        println!("id: {}", discount.id());
        println!("code: {}", discount.code());
        println!("value: {value}");
        println!("min_order_value: {}", discount.min_order_value());
        println!(
            "expires_at: {}",
            discount
                .expires_at()
                .map_or_else(|| "never".to_string(), |value| value.to_string())
        );
        println!("active: {}", discount.is_active());
        println!();
    }
}
