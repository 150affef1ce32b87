use clap::{Parser, Subcommand};
use colored::*;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

use salomao::ai::generator::DEFAULT_MODEL_CHAIN;
use salomao::{AnswerGenerator, ChatService, Config, GeminiClient, VerseStore};

#[derive(Parser)]
#[command(name = "salomao")]
#[command(about = "Bible study chatbot: verse search with Gemini-powered pastoral answers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question, grounded in verses retrieved from the local database
    Ask {
        /// Your question
        question: String,
        /// Try only this model instead of the configured fallback chain
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Search verse text
    Search {
        /// Search query
        query: String,
    },
    /// Look up a single verse by reference
    Show {
        /// Book name as stored in the database, e.g. "João"
        book: String,
        chapter: i64,
        verse: i64,
    },
    /// Build the full-text index (skipped if already present)
    Init,
    /// List models available to the configured API key
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let store = VerseStore::new(config.resolved_db_path());

    match cli.command {
        Commands::Ask { question, model } => ask(&config, store, &question, model).await?,
        Commands::Search { query } => search_verses(&store, &query)?,
        Commands::Show {
            book,
            chapter,
            verse,
        } => show_verse(&store, &book, chapter, verse)?,
        Commands::Init => init_index(&store)?,
        Commands::Models => list_models(&config).await?,
    }

    Ok(())
}

async fn ask(config: &Config, store: VerseStore, question: &str, model: Option<String>) -> Result<()> {
    if question.trim().is_empty() {
        println!("{}", "Por favor, envie uma pergunta válida.".red());
        return Ok(());
    }

    let generator = match &config.gemini_api_key {
        Some(key) => {
            let candidates = match model {
                Some(single) => vec![single],
                None => config.models.clone(),
            };
            AnswerGenerator::new(Box::new(GeminiClient::new(key)), candidates)
        }
        None => AnswerGenerator::disabled(),
    };
    let service = ChatService::new(store, generator, config.rag_flag);

    println!("🤔 Consultando Salomão...\n");

    match service.process(question).await {
        Ok(reply) => {
            println!("{}", reply.answer.green());
            println!("\n{}", reply.source.dimmed());
        }
        Err(e) => {
            println!("{}", e.user_message().red());
            println!("{}", format!("({e})").dimmed());
        }
    }

    Ok(())
}

fn search_verses(store: &VerseStore, query: &str) -> Result<()> {
    println!("🔍 Buscando: {}\n", query.bold().cyan());

    let citations = store.search(query)?;
    if citations.is_empty() {
        println!("{}", "Nenhum versículo encontrado".yellow());
        return Ok(());
    }

    for citation in &citations {
        println!("• {}", citation);
    }
    println!(
        "\n{} versículos encontrados",
        citations.len().to_string().bold()
    );

    Ok(())
}

fn show_verse(store: &VerseStore, book: &str, chapter: i64, verse: i64) -> Result<()> {
    match store.verse_by_reference(book, chapter, verse)? {
        Some(citation) => println!("{}", citation),
        None => println!(
            "{}",
            format!("Versículo não encontrado: {book} {chapter}:{verse}").yellow()
        ),
    }
    Ok(())
}

fn init_index(store: &VerseStore) -> Result<()> {
    if store.ensure_index()? {
        println!("{}", "✅ Índice de busca criado com sucesso.".green());
    } else {
        println!("Índice de busca já existe, nada a fazer.");
    }
    Ok(())
}

async fn list_models(config: &Config) -> Result<()> {
    let Some(key) = &config.gemini_api_key else {
        println!("{}", "GEMINI_API_KEY não configurada.".red());
        return Ok(());
    };

    let client = GeminiClient::new(key);
    println!("\n{}", "📋 Modelos disponíveis".bold().blue());

    match client.list_models().await {
        Ok(models) => {
            for model in &models {
                let marker = if DEFAULT_MODEL_CHAIN.contains(&model.as_str()) {
                    " (na cadeia padrão)".dimmed().to_string()
                } else {
                    String::new()
                };
                println!("  • {}{}", model.green(), marker);
            }
        }
        Err(e) => println!("{}: {}", "Erro ao listar modelos".red(), e),
    }

    Ok(())
}
