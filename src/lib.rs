//! License-key marketplace engine: key inventory, prepaid reseller
//! balances, an append-only transaction ledger, single-use invites,
//! subscriptions and Telegram WebApp sign-in.

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod telegram;
pub mod util;
