use std::sync::Arc;

use clap::Args;
use jiff::Timestamp;
use storefront::{
    ids::UserId,
    loyalty::{LedgerEntryKind, ledger_entries},
};
use storefront_app::{
    domain::loyalty::{LoyaltyLedger, PointsBalance, RemoteLoyaltyLedger},
    remote::RemoteStore,
};

#[derive(Debug, Args)]
pub(crate) struct BalanceArgs {
    /// User whose points to show
    #[arg(long)]
    user_id: UserId,
}

pub(crate) async fn run(args: BalanceArgs, remote: Arc<dyn RemoteStore>) -> Result<(), String> {
    let ledger = RemoteLoyaltyLedger::new(remote);
    let now = Timestamp::now();

    let transactions = ledger
        .transactions(args.user_id)
        .await
        .map_err(|error| format!("failed to read loyalty ledger: {error}"))?;

    let balance = PointsBalance::at(&transactions, now);

    println!("balance: {}", balance.balance);
    println!("spendable: {}", balance.spendable);
    println!("pending: {}", balance.pending);

    for entry in ledger_entries(&transactions, now) {
        println!(
            "{}  {:<8}  {:>+6}  order {}",
            entry.at,
            kind_label(entry.kind),
            entry.points,
            entry.order_id
        );
    }

    Ok(())
}

const fn kind_label(kind: LedgerEntryKind) -> &'static str {
    match kind {
        LedgerEntryKind::Earned => "earned",
        LedgerEntryKind::Redeemed => "redeemed",
        LedgerEntryKind::Expired => "expired",
    }
}
