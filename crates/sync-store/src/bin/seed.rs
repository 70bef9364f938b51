//! # Seed Data Generator
//!
//! Populates a local store with sample reference data and pre-orders for
//! development.
//!
//! ## Usage
//! ```bash
//! cargo run -p sync-store --bin seed
//! cargo run -p sync-store --bin seed -- --orders 500
//! cargo run -p sync-store --bin seed -- --db ./data/local.db
//! ```

use chrono::{Duration as ChronoDuration, Utc};
use std::env;
use sync_core::{Partner, Product, Unit};
use sync_store::{Database, DbConfig, NewOrder, NewOrderLine};
use uuid::Uuid;

const PARTNER_NAMES: &[&str] = &[
    "Riverside Grocers",
    "Maple Street Bakery",
    "Harborview Cafe",
    "Union Market",
    "Cedar Point Deli",
    "Lakeside Diner",
    "Northside Pantry",
    "Five Corners Grocery",
];

const PRODUCT_NAMES: &[&str] = &[
    "Whole Wheat Flour",
    "Rolled Oats",
    "Cane Sugar",
    "Sea Salt",
    "Olive Oil",
    "Canned Tomatoes",
    "Dried Basil",
    "Black Pepper",
    "Rice",
    "Lentils",
    "Butter",
    "Eggs",
];

const UNIT_DEFS: &[(&str, &str)] = &[
    ("Kilogram", "kg"),
    ("Box", "bx"),
    ("Each", "ea"),
    ("Liter", "L"),
];

struct SeedArgs {
    db_path: String,
    order_count: usize,
}

fn parse_args() -> SeedArgs {
    let mut db_path = "./data/local.db".to_string();
    let mut order_count = 200usize;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" => {
                if let Some(v) = args.get(i + 1) {
                    db_path = v.clone();
                    i += 1;
                }
            }
            "--orders" => {
                if let Some(v) = args.get(i + 1) {
                    order_count = v.parse().unwrap_or(order_count);
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    SeedArgs {
        db_path,
        order_count,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = parse_args();

    let db = Database::new(DbConfig::new(&args.db_path))
        .await
        .expect("failed to open local store");

    let now = Utc::now();

    let units: Vec<Unit> = UNIT_DEFS
        .iter()
        .map(|(name, abbr)| Unit {
            id: Uuid::now_v7(),
            name: name.to_string(),
            abbreviation: Some(abbr.to_string()),
            created_at: now,
            updated_at: now,
        })
        .collect();
    db.units().bulk_put(&units).await.expect("seed units");

    let products: Vec<Product> = PRODUCT_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| Product {
            id: Uuid::now_v7(),
            name: name.to_string(),
            sku: Some(format!("SKU-{i:04}")),
            default_unit_id: Some(units[i % units.len()].id),
            created_at: now,
            updated_at: now,
        })
        .collect();
    db.products().bulk_put(&products).await.expect("seed products");

    let partners: Vec<Partner> = PARTNER_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| Partner {
            id: Uuid::now_v7(),
            name: name.to_string(),
            contact_info: Some(format!("orders{i}@example.com")),
            created_at: now,
            updated_at: now,
        })
        .collect();
    db.partners().bulk_put(&partners).await.expect("seed partners");

    for i in 0..args.order_count {
        let partner = &partners[i % partners.len()];
        let delivery_date = now + ChronoDuration::days((i % 14) as i64 + 1);

        let order = db
            .orders()
            .create(NewOrder {
                partner_id: partner.id,
                order_date: Some(now),
                delivery_date,
                comment: None,
            })
            .await
            .expect("create seed order");

        let line_count = 1 + (i % 4);
        for j in 0..line_count {
            let product = &products[(i + j) % products.len()];
            db.order_lines()
                .create(NewOrderLine {
                    order_id: order.id,
                    product_id: product.id,
                    unit_id: product.default_unit_id.unwrap_or(units[0].id),
                    quantity: 1 + ((i + j) % 20) as i64,
                    price_cents: 199 + ((i * 37 + j * 11) % 4500) as i64,
                    comment: None,
                })
                .await
                .expect("create seed order line");
        }
    }

    println!(
        "seeded {} partners, {} products, {} units, {} orders into {}",
        partners.len(),
        products.len(),
        units.len(),
        args.order_count,
        args.db_path
    );
}
