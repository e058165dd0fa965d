use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::config::{Configuration, FormattingOptions as NevodFormattingOptions};
use crate::diagnostics::PublishDiagnostics;
use crate::error::ServiceError;
use crate::services::{Services, ServicesMode};
use crate::types::{self, CompletionKind, SourceEdit};
use crate::workspace;

const CMD_PEEK_REFERENCES: &str = "nevod.peekReferences";
const WATCHED_FILES_REGISTRATION_ID: &str = "nevod.watchedFiles";

pub struct NevodLanguageServer {
    client: Client,
    services: Mutex<Services>,
    /// Documents the client has open; their disk state is ignored.
    open_documents: Mutex<HashSet<Url>>,
    diagnostics: mpsc::UnboundedSender<PublishDiagnostics>,
}

impl NevodLanguageServer {
    pub fn new(client: Client) -> Self {
        let (diagnostics, mut receiver) = mpsc::unbounded_channel::<PublishDiagnostics>();
        let publisher = client.clone();
        tokio::spawn(async move {
            while let Some(batch) = receiver.recv().await {
                publisher.publish_diagnostics(batch.uri, batch.diagnostics, None).await;
            }
        });
        Self {
            client,
            services: Mutex::new(Services::new(ServicesMode::SingleFile)),
            open_documents: Mutex::new(HashSet::new()),
            diagnostics,
        }
    }

    fn services(&self) -> Result<MutexGuard<'_, Services>> {
        self.services.lock().map_err(|_| Error::internal_error())
    }

    /// Runs a query against the services, turning service errors into
    /// `invalid_params` responses.
    fn query<T>(&self, name: &str, f: impl FnOnce(&mut Services) -> crate::error::Result<T>) -> Result<T> {
        let mut services = self.services()?;
        f(&mut *services).map_err(|e| service_error(name, e))
    }

    fn subscribe_diagnostics(&self, services: &mut Services) {
        let sender = self.diagnostics.clone();
        services.subscribe_diagnostics(Box::new(move |batch: PublishDiagnostics| {
            if sender.send(batch).is_err() {
                tracing::warn!("diagnostics channel is closed");
            }
        }));
    }

    fn is_open(&self, uri: &Url) -> bool {
        self.open_documents
            .lock()
            .map(|open| open.contains(uri))
            .unwrap_or(false)
    }
}

fn service_error(request: &str, error: ServiceError) -> Error {
    tracing::warn!("{} failed: {}", request, error);
    Error::invalid_params(error.to_string())
}

fn to_text_edits(edits: Vec<SourceEdit>) -> Vec<TextEdit> {
    edits
        .into_iter()
        .map(|edit| TextEdit::new(edit.location.range, edit.new_text))
        .collect()
}

fn to_formatting_options(options: &FormattingOptions) -> NevodFormattingOptions {
    NevodFormattingOptions {
        tab_size: options.tab_size,
        insert_spaces: options.insert_spaces,
        new_line: None,
    }
}

fn to_completion_item_kind(kind: CompletionKind) -> CompletionItemKind {
    match kind {
        CompletionKind::Field => CompletionItemKind::FIELD,
        CompletionKind::Pattern => CompletionItemKind::FUNCTION,
        CompletionKind::Namespace => CompletionItemKind::MODULE,
        CompletionKind::Keyword => CompletionItemKind::KEYWORD,
        CompletionKind::FilePath => CompletionItemKind::FILE,
        CompletionKind::DirectoryPath => CompletionItemKind::FOLDER,
        CompletionKind::TextAttribute | CompletionKind::Token => CompletionItemKind::VALUE,
    }
}

fn to_completion_item(completion: types::Completion) -> CompletionItem {
    CompletionItem {
        label_details: completion.context.as_ref().map(|context| CompletionItemLabelDetails {
            detail: Some(format!(" (in {})", context)),
            description: None,
        }),
        kind: Some(to_completion_item_kind(completion.kind)),
        insert_text: completion.insert_text,
        filter_text: completion.filter_text,
        sort_text: Some(completion.sort_text.to_string()),
        text_edit: completion.text_edit.map(CompletionTextEdit::Edit),
        label: completion.text,
        ..Default::default()
    }
}

fn to_document_symbols(symbols: Vec<types::Symbol>) -> Vec<DocumentSymbol> {
    symbols
        .into_iter()
        .map(|symbol| {
            #[allow(deprecated)]
            DocumentSymbol {
                name: symbol.name,
                detail: Some(symbol.detail),
                kind: SymbolKind::FUNCTION,
                tags: None,
                deprecated: None,
                range: symbol.location.range,
                selection_range: symbol.name_location.range,
                children: Some(to_document_symbols(symbol.children)),
            }
        })
        .collect()
}

#[tower_lsp::async_trait]
impl LanguageServer for NevodLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        tracing::info!("initialize: received request");

        let folders = params.workspace_folders.unwrap_or_default();
        if let [folder] = folders.as_slice() {
            if let Ok(path) = folder.uri.to_file_path() {
                match workspace::load_workspace(&path) {
                    Ok(services) => *self.services()? = services,
                    Err(e) => tracing::error!("Failed to load workspace: {:#}", e),
                }
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                workspace_symbol_provider: Some(OneOf::Left(true)),
                code_lens_provider: Some(CodeLensOptions {
                    resolve_provider: Some(true),
                }),
                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: Default::default(),
                })),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string(), "/".to_string(), "\\".to_string()]),
                    ..Default::default()
                }),
                document_formatting_provider: Some(OneOf::Left(true)),
                document_range_formatting_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "nevod-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        tracing::info!("initialized: received notification");

        let message = match self.services() {
            Ok(mut services) => {
                self.subscribe_diagnostics(&mut services);
                match services.mode() {
                    ServicesMode::Workspace { root } => Some(format!(
                        "Nevod LSP initialized: {} packages in {}",
                        services.tracked_documents().len(),
                        root.display()
                    )),
                    ServicesMode::SingleFile => None,
                }
            }
            Err(_) => None,
        };

        let Some(message) = message else {
            self.client
                .log_message(MessageType::INFO, "Nevod LSP initialized (no workspace)")
                .await;
            return;
        };
        let watchers = DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![FileSystemWatcher {
                glob_pattern: GlobPattern::String("**/*.np".to_string()),
                kind: None,
            }],
        };
        let registration = Registration {
            id: WATCHED_FILES_REGISTRATION_ID.to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: serde_json::to_value(watchers).ok(),
        };
        if let Err(e) = self.client.register_capability(vec![registration]).await {
            tracing::warn!("Failed to register file watcher: {}", e);
        }
        self.client.log_message(MessageType::INFO, message).await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Ok(mut open) = self.open_documents.lock() {
            open.insert(uri.clone());
        }
        if let Ok(mut services) = self.services() {
            services.open_document(uri, params.text_document.text);
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Ok(mut services) = self.services() {
            if let Err(e) = services.update_document(&uri, params.content_changes) {
                tracing::warn!("did_change: {}", e);
            }
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Ok(mut open) = self.open_documents.lock() {
            open.remove(&uri);
        }
        if let Ok(mut services) = self.services() {
            services.close_document(&uri);
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let configuration = Configuration::from_settings(&params.settings);
        if let Ok(mut services) = self.services() {
            services.update_configuration(configuration);
        }
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        if let Ok(mut services) = self.services() {
            workspace::apply_file_events(&mut services, &params.changes, &|uri: &Url| self.is_open(uri));
        }
    }

    async fn goto_definition(&self, params: GotoDefinitionParams) -> Result<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        // On a definition itself, list its references instead.
        self.query("goto_definition", |services| {
            if let Some(definition) = services.definition(uri, position)? {
                return Ok(Some(GotoDefinitionResponse::Scalar(definition)));
            }
            Ok(services
                .references(uri, position)?
                .map(GotoDefinitionResponse::Array))
        })
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        self.query("references", |services| services.references(uri, position))
    }

    async fn document_symbol(&self, params: DocumentSymbolParams) -> Result<Option<DocumentSymbolResponse>> {
        let uri = &params.text_document.uri;
        let symbols = self.query("document_symbol", |services| services.document_symbols(uri))?;
        Ok(Some(DocumentSymbolResponse::Nested(to_document_symbols(symbols))))
    }

    async fn symbol(&self, params: WorkspaceSymbolParams) -> Result<Option<Vec<SymbolInformation>>> {
        let symbols = self.query("symbol", |services| services.filtered_symbols(&params.query))?;
        let results: Vec<SymbolInformation> = symbols
            .into_iter()
            .map(|symbol| {
                #[allow(deprecated)]
                SymbolInformation {
                    name: symbol.detail,
                    kind: SymbolKind::FUNCTION,
                    tags: None,
                    deprecated: None,
                    location: symbol.name_location,
                    container_name: None,
                }
            })
            .collect();

        if results.is_empty() {
            Ok(None)
        } else {
            Ok(Some(results))
        }
    }

    async fn code_lens(&self, params: CodeLensParams) -> Result<Option<Vec<CodeLens>>> {
        let uri = params.text_document.uri;
        let lenses = self.query("code_lens", |services| services.code_lens(&uri))?;
        Ok(Some(
            lenses
                .into_iter()
                .map(|lens| CodeLens {
                    range: lens.range,
                    command: None,
                    data: serde_json::to_value(Location::new(uri.clone(), lens.active_range)).ok(),
                })
                .collect(),
        ))
    }

    async fn code_lens_resolve(&self, mut lens: CodeLens) -> Result<CodeLens> {
        let location: Location = lens
            .data
            .clone()
            .and_then(|data| serde_json::from_value(data).ok())
            .ok_or_else(|| Error::invalid_params("Cannot resolve code lens"))?;
        let references = self.query("code_lens_resolve", |services| {
            services.references(&location.uri, location.range.start)
        })?;
        if let Some(references) = references {
            let title = if references.len() == 1 {
                "1 reference".to_string()
            } else {
                format!("{} references", references.len())
            };
            lens.command = Some(Command {
                title,
                command: CMD_PEEK_REFERENCES.to_string(),
                arguments: Some(vec![
                    serde_json::json!(location.uri),
                    serde_json::json!(location.range.start),
                ]),
            });
        }
        Ok(lens)
    }

    async fn prepare_rename(&self, params: TextDocumentPositionParams) -> Result<Option<PrepareRenameResponse>> {
        let info = self.query("prepare_rename", |services| {
            services.rename_info(&params.text_document.uri, params.position)
        })?;
        Ok(info.map(|info| PrepareRenameResponse::RangeWithPlaceholder {
            range: info.range,
            placeholder: info.text,
        }))
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let new_name = params.new_name;

        let Some(edits) = self.query("rename", |services| services.rename(uri, position, &new_name))? else {
            return Ok(None);
        };
        let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();
        for edit in edits {
            changes
                .entry(edit.location.uri.clone())
                .or_default()
                .push(TextEdit::new(edit.location.range, edit.new_text));
        }
        tracing::info!("Rename to {} affects {} files", new_name, changes.len());
        Ok(Some(WorkspaceEdit {
            changes: Some(changes),
            ..Default::default()
        }))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let completions = self.query("completion", |services| services.completions(uri, position))?;
        Ok(completions.map(|completions| {
            CompletionResponse::Array(completions.into_iter().map(to_completion_item).collect())
        }))
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let options = to_formatting_options(&params.options);
        let edits = self.query("formatting", |services| {
            services.format_document(&params.text_document.uri, &options)
        })?;
        Ok(Some(to_text_edits(edits)))
    }

    async fn range_formatting(&self, params: DocumentRangeFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let options = to_formatting_options(&params.options);
        let edits = self.query("range_formatting", |services| {
            services.format_range(&params.text_document.uri, params.range, &options)
        })?;
        Ok(Some(to_text_edits(edits)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_item_conversion() {
        let completion = types::Completion::with_insert_text(CompletionKind::Pattern, "P", Some("N".to_string()), "N.P");
        let item = to_completion_item(completion);
        assert_eq!(item.label, "P");
        assert_eq!(item.kind, Some(CompletionItemKind::FUNCTION));
        assert_eq!(item.insert_text.as_deref(), Some("N.P"));
        assert_eq!(item.sort_text.as_deref(), Some("0"));
        assert_eq!(item.label_details.unwrap().detail.as_deref(), Some(" (in N)"));

        let keyword = to_completion_item(types::Completion::new(CompletionKind::Keyword, "@where"));
        assert_eq!(keyword.kind, Some(CompletionItemKind::KEYWORD));
        assert!(keyword.label_details.is_none());
    }

    #[test]
    fn test_document_symbol_conversion() {
        let uri = Url::parse("file:///test/Main.np").unwrap();
        let location = |start: u32, end: u32| Location::new(uri.clone(), Range::new(Position::new(0, start), Position::new(0, end)));
        let symbols = vec![types::Symbol {
            name: "P".to_string(),
            detail: "P".to_string(),
            children: vec![types::Symbol {
                name: "Q".to_string(),
                detail: "P.Q".to_string(),
                children: Vec::new(),
                location: location(18, 26),
                name_location: location(18, 19),
            }],
            location: location(0, 29),
            name_location: location(0, 1),
        }];

        let converted = to_document_symbols(symbols);

        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].selection_range, location(0, 1).range);
        let children = converted[0].children.as_ref().unwrap();
        assert_eq!(children[0].detail.as_deref(), Some("P.Q"));
    }

    #[test]
    fn test_formatting_options_conversion() {
        let options = FormattingOptions {
            tab_size: 2,
            insert_spaces: false,
            ..Default::default()
        };
        let converted = to_formatting_options(&options);
        assert_eq!(converted.tab_size, 2);
        assert!(!converted.insert_spaces);
        assert_eq!(converted.new_line, None);
    }
}
