use clap::{Args, Subcommand};
use quire::ids::{BookId, CustomerId};
use quire_app::{context::AppContext, session::CustomerSession};

use super::print_cart;

#[derive(Debug, Args)]
pub(crate) struct CartCommand {
    #[command(subcommand)]
    command: CartSubcommand,
}

#[derive(Debug, Subcommand)]
enum CartSubcommand {
    /// Print the cart grouped by seller
    Show(ShowCartArgs),

    /// Add copies of a book
    Add(AddBookArgs),

    /// Change a line's quantity by a signed delta
    Update(UpdateQuantityArgs),

    /// Remove a book from the cart
    Remove(RemoveBookArgs),
}

#[derive(Debug, Args)]
struct ShowCartArgs {
    /// Customer id
    #[arg(long)]
    customer: u64,
}

#[derive(Debug, Args)]
struct AddBookArgs {
    /// Customer id
    #[arg(long)]
    customer: u64,

    /// Book id
    #[arg(long)]
    book: u64,

    /// Copies to add
    #[arg(long, default_value_t = 1)]
    quantity: i32,
}

#[derive(Debug, Args)]
struct UpdateQuantityArgs {
    /// Customer id
    #[arg(long)]
    customer: u64,

    /// Book id
    #[arg(long)]
    book: u64,

    /// Signed change; reaching zero removes the line
    #[arg(long, allow_negative_numbers = true)]
    delta: i32,
}

#[derive(Debug, Args)]
struct RemoveBookArgs {
    /// Customer id
    #[arg(long)]
    customer: u64,

    /// Book id
    #[arg(long)]
    book: u64,
}

pub(crate) async fn run(command: CartCommand, context: AppContext) -> Result<(), String> {
    let customer = match &command.command {
        CartSubcommand::Show(args) => args.customer,
        CartSubcommand::Add(args) => args.customer,
        CartSubcommand::Update(args) => args.customer,
        CartSubcommand::Remove(args) => args.customer,
    };

    let session = CustomerSession::open(context, CustomerId::new(customer))
        .await
        .map_err(|error| format!("failed to load cart: {error}"))?;

    let change = match command.command {
        CartSubcommand::Show(_) => None,
        CartSubcommand::Add(args) => Some(
            session
                .add_book(BookId::new(args.book), args.quantity)
                .await,
        ),
        CartSubcommand::Update(args) => Some(
            session
                .update_quantity(BookId::new(args.book), args.delta)
                .await,
        ),
        CartSubcommand::Remove(args) => Some(session.remove(BookId::new(args.book)).await),
    };

    if let Some(change) = change {
        let change = change.map_err(|error| format!("failed to update cart: {error}"))?;
        println!("change: {change:?}");
    }

    print_cart(&session.cart());

    Ok(())
}
