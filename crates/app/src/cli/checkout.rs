use clap::Args;
use quire::ids::CustomerId;
use quire_app::{context::AppContext, session::CustomerSession};

use super::{MethodArg, vouchers::select};

#[derive(Debug, Args)]
pub(crate) struct CheckoutArgs {
    /// Customer id
    #[arg(long)]
    customer: u64,

    /// Books to order; every line when omitted
    #[arg(long = "book")]
    books: Vec<u64>,

    /// Voucher code to apply
    #[arg(long)]
    voucher: Option<String>,

    /// Payment method
    #[arg(long, value_enum, default_value_t = MethodArg::Cod)]
    method: MethodArg,
}

pub(crate) async fn run(args: CheckoutArgs, context: AppContext) -> Result<(), String> {
    let session = CustomerSession::open(context, CustomerId::new(args.customer))
        .await
        .map_err(|error| format!("failed to load cart: {error}"))?;

    select(&session, &args.books)?;

    if let Some(code) = &args.voucher {
        session
            .apply_voucher(code)
            .await
            .map_err(|error| format!("failed to apply voucher {code}: {error}"))?;
    }

    let placed = session
        .checkout(args.method.into())
        .await
        .map_err(|error| format!("checkout failed: {error}"))?;

    let totals = placed.draft.totals;

    println!("order_id: {}", placed.order.id);
    println!("status: {}", placed.order.status);
    println!("original: {}", totals.original);
    println!("saved: {}", totals.saved);
    println!("to_pay: {}", totals.discounted);
    println!("payment_id: {}", placed.payment.id);
    println!("payment_method: {}", placed.payment.method);
    println!("payment_status: {}", placed.payment.status);

    Ok(())
}
