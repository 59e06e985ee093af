use std::fmt::Display;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use home_inventory::client::{Client, ClientError};
use home_inventory::config::ClientArgs;
use home_inventory::service::{InventoryRecord, ItemRecord};
use home_inventory::telemetry;

const MENU: &str = "\t\t\tHousehold Inventory Application

\t\t1. New Inventory
\t\t2. List Inventories
\t\t3. Select Inventory
\t\t4. List Inventory Items
\t\t5. Add Items
\t\t6. Exit
";

struct App {
    client: Client,
    input: Lines<BufReader<Stdin>>,
    active_inventory_id: i64,
}

#[tokio::main]
async fn main() {
    telemetry::init();

    let args = ClientArgs::parse();

    println!(
        "Connecting to server at IP Address: {} and Port: {}",
        args.host, args.port
    );

    let client = match Client::connect((args.host.as_str(), args.port)).await {
        Ok(client) => client,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };

    let mut app = App {
        client,
        input: BufReader::new(tokio::io::stdin()).lines(),
        active_inventory_id: 0,
    };

    if let Err(err) = app.run().await {
        eprintln!("{err}");
        process::exit(1);
    }
}

impl App {
    async fn run(&mut self) -> Result<(), ClientError> {
        loop {
            clear_screen();
            println!("{MENU}");

            let Some(choice) = self.ask("Please enter menu item number: ").await? else {
                return Ok(());
            };

            let outcome = match choice.trim() {
                "1" => self.new_inventory().await,
                "2" => self.list_inventories().await,
                "3" => self.select_inventory().await,
                "4" => self.list_inventory_items().await,
                "5" => self.add_items().await,
                "6" => {
                    println!("Goodbye!");
                    return Ok(());
                }
                _ => {
                    println!("Invalid Menu Choice!");
                    self.pause().await
                }
            };

            match outcome {
                // Server-side failures are shown and the menu keeps going.
                Err(err @ ClientError::Server { .. }) => {
                    println!("{err}");
                    self.pause().await?;
                }
                other => other?,
            }
        }
    }

    async fn new_inventory(&mut self) -> Result<(), ClientError> {
        clear_screen();

        let name = self.ask("Inventory name: ").await?.unwrap_or_default();
        let description = self.ask("Inventory description: ").await?.unwrap_or_default();

        let id = self.client.new_inventory(&name, &description).await?;
        println!("Created inventory {id}.");

        self.pause().await
    }

    async fn list_inventories(&mut self) -> Result<(), ClientError> {
        clear_screen();

        let inventories = self.client.list_inventories().await?;
        print_inventories(&inventories);

        self.pause().await
    }

    async fn select_inventory(&mut self) -> Result<(), ClientError> {
        clear_screen();

        let inventories = self.client.list_inventories().await?;

        loop {
            print_inventories(&inventories);

            let Some(answer) = self.ask("\n\nSelect inventory id from list: ").await? else {
                return Ok(());
            };
            let Ok(id) = answer.trim().parse::<i64>() else {
                println!("'{}' is not an inventory id.", answer.trim());
                continue;
            };

            let confirm = self
                .ask(&format!("You entered {id}. Is this correct? (y/n) "))
                .await?
                .unwrap_or_default();

            if confirm.trim().eq_ignore_ascii_case("y") {
                self.active_inventory_id = id;
                return Ok(());
            }
        }
    }

    async fn list_inventory_items(&mut self) -> Result<(), ClientError> {
        clear_screen();

        let items = self
            .client
            .list_inventory_items(self.active_inventory_id)
            .await?;
        print_items(&items);

        self.pause().await
    }

    async fn add_items(&mut self) -> Result<(), ClientError> {
        let name = self.ask("Item name: ").await?.unwrap_or_default();
        let count = self.ask("Item count: ").await?.unwrap_or_default();

        let Ok(count) = count.trim().parse::<i64>() else {
            println!("Item count must be a whole number.");
            return self.pause().await;
        };

        self.client
            .add_inventory_item(self.active_inventory_id, &name, count)
            .await?;

        Ok(())
    }

    /// Prints `question` and waits for a line; `None` once stdin is closed.
    async fn ask(&mut self, question: &str) -> Result<Option<String>, ClientError> {
        print!("{question}");
        io::stdout().flush()?;

        Ok(self.input.next_line().await?)
    }

    async fn pause(&mut self) -> Result<(), ClientError> {
        self.ask("\n\nPress enter to continue...").await?;

        Ok(())
    }
}

fn clear_screen() {
    print!("\x1B[2J\x1B[1;1H");
}

fn print_inventories(inventories: &[InventoryRecord]) {
    let rows = inventories
        .iter()
        .map(|inv| vec![cell(inv.id), cell(&inv.name), cell(&inv.description)])
        .collect::<Vec<_>>();

    print_table(&["ID", "Name", "Description"], &rows);
}

fn print_items(items: &[ItemRecord]) {
    let rows = items
        .iter()
        .map(|item| {
            vec![
                cell(item.id),
                cell(item.inventory_id),
                cell(&item.name),
                cell(item.count),
            ]
        })
        .collect::<Vec<_>>();

    print_table(&["ID", "Inventory ID", "Item", "Count"], &rows);
}

fn cell(value: impl Display) -> String {
    value.to_string()
}

fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(col, header)| {
            rows.iter()
                .map(|row| row[col].chars().count())
                .chain([header.chars().count()])
                .max()
                .unwrap_or(0)
        })
        .collect();

    let border = widths
        .iter()
        .map(|width| "-".repeat(width + 2))
        .collect::<Vec<_>>()
        .join("+");
    let border = format!("+{border}+");

    let line = |cells: Vec<&str>| {
        let cells = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!(" {cell:^width$} "))
            .collect::<Vec<_>>()
            .join("|");
        format!("|{cells}|")
    };

    println!("{border}");
    println!("{}", line(headers.to_vec()));
    println!("{border}");
    for row in rows {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
    println!("{border}");
}
