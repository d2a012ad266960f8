//! Главный исполняемый файл campusdb

use campusdb::common::DbConfig;
use campusdb::store::{init_client, ConnectionProvider};
use campusdb::VERSION;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "campusdb")]
#[command(about = "Транзакционный слой доступа к данным планировщика кампуса")]
#[command(version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Проверяет подключение по конфигурации из переменных окружения
    Ping,
    /// Показывает информацию о слое доступа
    Info,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Ping) => {
            let config = DbConfig::from_env()?;
            println!("Проверка подключения: {}", config.connect_string);
            init_client(&config)?;
            let provider = ConnectionProvider::new(config)?;
            let mut connection = provider.acquire().await?;
            println!("Соединение {} получено успешно!", connection.id());
            connection.close()?;
            println!("Соединение возвращено");
        }
        Some(Commands::Info) => {
            println!("Информация о слое доступа:");
            println!("Версия: {}", VERSION);
        }
        None => {
            println!("Добро пожаловать в campusdb v{}!", VERSION);
            println!("Используйте --help для получения справки");
        }
    }

    Ok(())
}
