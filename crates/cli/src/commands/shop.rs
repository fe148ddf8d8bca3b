//! Interactive shopping session.
//!
//! Owns one in-memory cart for the lifetime of the session. Commands:
//!
//! ```text
//! list                 browse the catalog
//! view <id>            product details
//! add <id> [qty]       add to cart (requires sign-in)
//! update <id> <qty>    set a quantity; 0 removes the line
//! inc <id> / dec <id>  change a quantity by one
//! remove <id>          drop a line
//! cart                 show the cart
//! clear                empty the cart
//! checkout             place the order and empty the cart
//! goto <path>          navigate, e.g. `goto /add-product`
//! whoami               session and menu
//! quit
//! ```

use std::io::Write;
use std::str::FromStr;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use ann_traders_core::{Cart, ProductId, RouteDecision};
use ann_traders_storefront::error::add_breadcrumb;
use ann_traders_storefront::routes::Route;
use ann_traders_storefront::{AppError, AppState};

use super::{account, products};

/// A parsed shop command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShopCommand {
    List,
    View(ProductId),
    Add(ProductId, u32),
    Update(ProductId, u32),
    Increment(ProductId),
    Decrement(ProductId),
    Remove(ProductId),
    ShowCart,
    Clear,
    Checkout,
    Goto(String),
    WhoAmI,
    Help,
    Quit,
}

/// Why a line could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("`{0}` needs {1}")]
    MissingArgument(&'static str, &'static str),
    #[error("`{0}` is not a product id")]
    BadId(String),
    #[error("`{0}` is not a quantity")]
    BadQuantity(String),
}

fn product_id(command: &'static str, arg: Option<&str>) -> Result<ProductId, ParseError> {
    let arg = arg.ok_or(ParseError::MissingArgument(command, "a product id"))?;
    arg.parse().map_err(|_| ParseError::BadId(arg.to_string()))
}

fn quantity(arg: &str) -> Result<u32, ParseError> {
    arg.parse().map_err(|_| ParseError::BadQuantity(arg.to_string()))
}

impl FromStr for ShopCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(Self::Help);
        };
        let first = words.next();
        let second = words.next();

        match command.to_ascii_lowercase().as_str() {
            "list" | "ls" => Ok(Self::List),
            "view" => Ok(Self::View(product_id("view", first)?)),
            "add" => {
                let id = product_id("add", first)?;
                let qty = second.map_or(Ok(1), quantity)?;
                Ok(Self::Add(id, qty))
            }
            "update" => {
                let id = product_id("update", first)?;
                let qty = second.ok_or(ParseError::MissingArgument("update", "a quantity"))?;
                Ok(Self::Update(id, quantity(qty)?))
            }
            "inc" => Ok(Self::Increment(product_id("inc", first)?)),
            "dec" => Ok(Self::Decrement(product_id("dec", first)?)),
            "remove" | "rm" => Ok(Self::Remove(product_id("remove", first)?)),
            "cart" => Ok(Self::ShowCart),
            "clear" => Ok(Self::Clear),
            "checkout" => Ok(Self::Checkout),
            "goto" => first
                .map(|path| Self::Goto(path.to_string()))
                .ok_or(ParseError::MissingArgument("goto", "a path")),
            "whoami" => Ok(Self::WhoAmI),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

pub async fn run(state: &AppState) -> Result<(), AppError> {
    let status = state.session().restore_session().await;
    println!("ANN Traders. {status}. Type `help` for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}> ", cart_prompt(&state.cart_snapshot()));
        std::io::stdout()
            .flush()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
        else {
            break;
        };

        let command = match line.parse::<ShopCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if command == ShopCommand::Quit {
            break;
        }

        // Errors end the command, not the session.
        if let Err(e) = execute(state, command).await {
            e.report();
            println!("{}", e.user_message());
        }
    }

    println!("Bye.");
    Ok(())
}

fn cart_prompt(cart: &Cart) -> String {
    match cart.total_quantity() {
        0 => "shop".to_string(),
        n => format!("shop [cart: {n}]"),
    }
}

async fn execute(state: &AppState, command: ShopCommand) -> Result<(), AppError> {
    match command {
        ShopCommand::List => products::list(state).await?,
        ShopCommand::View(id) => products::show(state, id).await?,
        ShopCommand::Add(id, qty) => {
            if qty == 0 {
                println!("Nothing to add.");
                return Ok(());
            }
            let product = state.catalog().get_product(id).await?;
            let title = product.title.clone();
            match state.add_to_cart(product, qty) {
                RouteDecision::Allow => println!("Added {qty} x {title} to the cart."),
                _ => println!("Please sign in first (`ann-cli login`)."),
            }
        }
        ShopCommand::Update(id, qty) => {
            state.with_cart(|cart| cart.update_quantity(id, qty));
            print_cart(&state.cart_snapshot());
        }
        ShopCommand::Increment(id) => {
            state.with_cart(|cart| cart.increment(id));
            print_cart(&state.cart_snapshot());
        }
        ShopCommand::Decrement(id) => {
            state.with_cart(|cart| cart.decrement(id));
            print_cart(&state.cart_snapshot());
        }
        ShopCommand::Remove(id) => {
            state.with_cart(|cart| cart.remove_item(id));
            print_cart(&state.cart_snapshot());
        }
        ShopCommand::ShowCart => print_cart(&state.cart_snapshot()),
        ShopCommand::Clear => {
            state.with_cart(Cart::clear);
            add_breadcrumb("cart", "Cleared cart", None);
            println!("Cart cleared.");
        }
        ShopCommand::Checkout => match state.checkout() {
            Some(summary) => {
                println!(
                    "Order placed: {} item(s), subtotal {:.2}.",
                    summary.total_quantity, summary.subtotal
                );
            }
            None => println!("Your cart is empty."),
        },
        ShopCommand::Goto(path) => goto(state, &path).await?,
        ShopCommand::WhoAmI => account::print_status(state, &state.session().status()),
        ShopCommand::Help => println!("{}", HELP.trim()),
        ShopCommand::Quit => {}
    }
    Ok(())
}

async fn goto(state: &AppState, path: &str) -> Result<(), AppError> {
    let Some(navigation) = state.navigate(path) else {
        println!("No page at {path}.");
        return Ok(());
    };
    if navigation.shown != navigation.requested {
        println!("{} -> redirected to {}", navigation.requested, navigation.shown);
    }

    match navigation.shown {
        Route::Home => products::list(state).await?,
        Route::Cart => print_cart(&state.cart_snapshot()),
        Route::Product(id) => products::show(state, id).await?,
        Route::AddProduct => println!("Add products with `ann-cli products add`."),
        Route::Login => println!("Sign in with `ann-cli login -e <email> -p <password>`."),
        Route::Register => println!("Create an account with `ann-cli register`."),
    }
    Ok(())
}

fn print_cart(cart: &Cart) {
    if cart.is_empty() {
        println!("Your cart is empty.");
        return;
    }
    for line in cart.lines() {
        let product = line.product();
        println!(
            "{:>6}  {:<28} {:>4} x {:>10} = {}",
            product.id,
            product.title,
            line.quantity(),
            product.unit_price().to_string(),
            line.line_total()
        );
    }
    println!(
        "Items: {}   Subtotal: {:.2}",
        cart.total_quantity(),
        cart.subtotal()
    );
}

const HELP: &str = "
list | view <id> | add <id> [qty] | update <id> <qty> | inc <id> | dec <id>
remove <id> | cart | clear | checkout | goto <path> | whoami | quit
";
