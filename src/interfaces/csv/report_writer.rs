use crate::application::machine::VendingMachine;
use crate::domain::product::Product;
use crate::domain::user::User;
use crate::error::Result;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const USERS_REPORT: &str = "users.csv";
pub const PRODUCTS_REPORT: &str = "products.csv";

#[derive(Serialize)]
struct UserRow<'a> {
    username: &'a str,
    role: &'a str,
    deposit: u64,
}

#[derive(Serialize)]
struct ProductRow<'a> {
    id: &'a str,
    name: &'a str,
    available: u64,
    cost: u64,
    seller_id: &'a str,
}

/// Writes final machine state as CSV. Password hashes are never written.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(sink),
        }
    }

    pub fn write_users(mut self, users: &[User]) -> Result<()> {
        self.writer.write_record(["username", "role", "deposit"])?;
        for user in users {
            self.writer.serialize(UserRow {
                username: &user.username,
                role: user.role.as_str(),
                deposit: user.deposit.value(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_products(mut self, products: &[Product]) -> Result<()> {
        self.writer
            .write_record(["id", "name", "available", "cost", "seller_id"])?;
        for product in products {
            self.writer.serialize(ProductRow {
                id: &product.id,
                name: &product.name,
                available: product.available,
                cost: product.cost,
                seller_id: &product.seller_id,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Dumps users and products into `dir`, creating it if needed.
pub async fn write_report(machine: &VendingMachine, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let users = machine.accounts().all().await?;
    ReportWriter::new(File::create(dir.join(USERS_REPORT))?).write_users(&users)?;

    let products = machine.catalog().list().await?;
    ReportWriter::new(File::create(dir.join(PRODUCTS_REPORT))?).write_products(&products)?;
    Ok(())
}
