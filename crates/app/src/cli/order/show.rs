use std::sync::Arc;

use clap::Args;
use storefront::{ids::OrderId, money::format_amount};
use storefront_app::remote::RemoteStore;

#[derive(Debug, Args)]
pub(crate) struct ShowArgs {
    /// Order to show
    #[arg(long)]
    order_id: OrderId,
}

pub(crate) async fn run(args: ShowArgs, remote: Arc<dyn RemoteStore>) -> Result<(), String> {
    let order = remote
        .fetch_order(args.order_id)
        .await
        .map_err(|error| format!("failed to fetch order: {error}"))?;

    println!("order: {}", order.display_order_id);
    println!("order_id: {}", order.order_id);
    println!("user_id: {}", order.user_id);
    println!("placed: {}", order.created_at);
    println!(
        "status: {} / {}",
        order.status.as_str(),
        order.shipping_status.as_str()
    );
    println!("payment: {}", order.payment_method.as_str());

    for line in &order.items {
        println!(
            "  {} {} x{} @ {} = {}",
            line.product_id,
            line.selected_size.as_deref().unwrap_or("-"),
            line.quantity,
            format_amount(line.unit_price),
            format_amount(line.line_total),
        );
    }

    println!("subtotal: {}", format_amount(order.totals.subtotal));
    println!("discount: {}", format_amount(order.totals.discount));
    println!("points: {} ({})", order.points_redeemed, format_amount(order.totals.points_discount));
    println!("shipping: {}", format_amount(order.totals.shipping_charge));
    println!("total: {}", format_amount(order.totals.total));
    println!("shipping_details: {}", order.shipping_details);

    Ok(())
}
