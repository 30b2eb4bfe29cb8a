use std::sync::Arc;

use clap::Args;
use storefront::{
    cart::{CartLine, CartSnapshot},
    ids::{ProductId, UserId},
    money::format_amount,
};
use storefront_app::{
    domain::promotions::{PromoError, PromoLedger, RemotePromoLedger},
    remote::RemoteStore,
};

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    /// Promo code as the customer typed it
    #[arg(long)]
    code: String,

    /// User applying the code
    #[arg(long)]
    user_id: UserId,

    /// Cart subtotal in paise
    #[arg(long)]
    subtotal: u64,

    /// Product in the cart, for product-scoped codes
    #[arg(long)]
    product_id: Option<ProductId>,
}

pub(crate) async fn run(args: CheckArgs, remote: Arc<dyn RemoteStore>) -> Result<(), String> {
    let cart = CartSnapshot::from(vec![CartLine {
        product_id: args.product_id.unwrap_or_default(),
        selected_size: None,
        quantity: 1,
        unit_price: args.subtotal,
    }]);

    match RemotePromoLedger::new(remote)
        .validate(args.code, args.user_id, cart)
        .await
    {
        Ok(quote) => {
            println!("accepted: {}", quote.code);
            println!("discount: {}% ({})", quote.discount_percent, format_amount(quote.discount_amount));

            Ok(())
        }
        Err(PromoError::Rejected(reason)) => {
            println!("rejected: {reason}");

            Ok(())
        }
        Err(error) => Err(format!("failed to check promo code: {error}")),
    }
}
