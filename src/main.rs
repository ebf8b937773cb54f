use std::collections::HashMap;

use iced::widget::image::Handle as ImageHandle;
use iced::widget::{self, button, column, container, row, scrollable, text, text_input, Column};
use iced::{Alignment, Element, Length, Task, Theme};
use rfd::FileDialog;
use tracing_subscriber::EnvFilter;

mod archive;
mod config;
mod state;
#[cfg(test)]
mod testing;

use state::actor::{LibraryHandle, Navigation};
use state::catalog::LibraryStore;
use state::data::ComicSnapshot;
use state::manager::{ImportResult, LibraryManager};

/// A comic on screen: its display data plus the decoded current page
type Displayed = (ComicSnapshot, ImageHandle);

/// Main application state
///
/// Holds only what is needed to draw the window. The library itself lives
/// in the library worker and is changed exclusively through `LibraryHandle`.
struct ComicReader {
    library: LibraryHandle,
    titles: Vec<String>,
    thumbnails: HashMap<String, ImageHandle>,
    current: Option<Displayed>,
    page_input: String,
    /// Status message to display to the user
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    OpenArchive,
    ImportFolder,
    Quit,
    Select(String),
    Navigate(Navigation),
    PageInput(String),
    GoToPage,
    Close,
    Delete,
    TitlesLoaded(Result<Vec<String>, String>),
    MissingChecked(Result<Vec<String>, String>),
    ThumbnailLoaded(String, Result<ImageHandle, String>),
    Opened(Result<ComicSnapshot, String>),
    ImportComplete(Result<ImportResult, String>),
    Displayed(Result<Displayed, String>),
    Closed(Result<String, String>),
    Deleted(Result<String, String>),
}

impl ComicReader {
    /// Create a new instance of the application
    fn new(library: LibraryHandle) -> (Self, Task<Message>) {
        let reader = ComicReader {
            library,
            titles: Vec::new(),
            thumbnails: HashMap::new(),
            current: None,
            page_input: String::new(),
            status: "Ready.".to_string(),
        };

        let startup = Task::batch([reader.load_titles(), reader.check_missing()]);
        (reader, startup)
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::OpenArchive => {
                let file = FileDialog::new()
                    .set_title("Open Comic Book Archive")
                    .add_filter("Comic Book Archive (.cbz, .cbr)", &["cbz", "cbr"])
                    .pick_file();

                match file {
                    Some(path) => {
                        self.status = format!("Opening {}...", path.display());
                        let library = self.library.clone();
                        Task::perform(
                            async move { library.open(path).await.map_err(|e| e.to_string()) },
                            Message::Opened,
                        )
                    }
                    None => Task::none(),
                }
            }
            Message::ImportFolder => {
                let folder = FileDialog::new()
                    .set_title("Select Folder with Comics")
                    .pick_folder();

                match folder {
                    Some(dir) => {
                        self.status = format!("Importing from {}...", dir.display());
                        let library = self.library.clone();
                        Task::perform(
                            async move { library.import_folder(dir).await.map_err(|e| e.to_string()) },
                            Message::ImportComplete,
                        )
                    }
                    None => Task::none(),
                }
            }
            // Reading positions are recorded by main once the window loop ends
            Message::Quit => iced::exit(),
            Message::Select(title) => {
                let library = self.library.clone();
                Task::perform(
                    async move {
                        library.show(title.clone()).await.map_err(|e| e.to_string())?;
                        display(&library, title).await
                    },
                    Message::Displayed,
                )
            }
            Message::Navigate(to) => match self.current_title() {
                Some(title) => {
                    let library = self.library.clone();
                    Task::perform(
                        async move {
                            library.navigate(title.clone(), to).await.map_err(|e| e.to_string())?;
                            display(&library, title).await
                        },
                        Message::Displayed,
                    )
                }
                None => Task::none(),
            },
            Message::PageInput(input) => {
                self.page_input = input;
                Task::none()
            }
            Message::GoToPage => match self.current_title() {
                Some(title) => {
                    let library = self.library.clone();
                    let input = std::mem::take(&mut self.page_input);
                    Task::perform(
                        async move {
                            library
                                .go_to_page_number(title.clone(), input)
                                .await
                                .map_err(|e| e.to_string())?;
                            display(&library, title).await
                        },
                        Message::Displayed,
                    )
                }
                None => Task::none(),
            },
            Message::Close => match self.current_title() {
                Some(title) => {
                    let library = self.library.clone();
                    Task::perform(
                        async move { library.close(title.clone()).await.map(|()| title).map_err(|e| e.to_string()) },
                        Message::Closed,
                    )
                }
                None => Task::none(),
            },
            Message::Delete => match self.current_title() {
                Some(title) => {
                    let library = self.library.clone();
                    Task::perform(
                        async move { library.delete(title.clone()).await.map(|()| title).map_err(|e| e.to_string()) },
                        Message::Deleted,
                    )
                }
                None => Task::none(),
            },
            Message::TitlesLoaded(Ok(titles)) => {
                let missing: Vec<Task<Message>> = titles
                    .iter()
                    .filter(|title| !self.thumbnails.contains_key(*title))
                    .map(|title| self.load_thumbnail(title.clone()))
                    .collect();
                self.titles = titles;
                Task::batch(missing)
            }
            Message::MissingChecked(Ok(missing)) => {
                if !missing.is_empty() {
                    self.status = format!(
                        "{} comic(s) can no longer be found on disk: {}",
                        missing.len(),
                        missing.join(", ")
                    );
                }
                Task::none()
            }
            Message::ThumbnailLoaded(title, Ok(handle)) => {
                self.thumbnails.insert(title, handle);
                Task::none()
            }
            Message::ThumbnailLoaded(title, Err(e)) => {
                tracing::debug!(title = %title, error = %e, "no thumbnail");
                Task::none()
            }
            Message::Opened(Ok(comic)) => {
                self.status = format!("Opened {} ({} pages).", comic.title, comic.page_count);
                let library = self.library.clone();
                let title = comic.title.clone();
                Task::batch([
                    self.load_titles(),
                    Task::perform(async move { display(&library, title).await }, Message::Displayed),
                ])
            }
            Message::ImportComplete(Ok(result)) => {
                self.status = format!(
                    "Import complete! Added {} comics, skipped {} duplicates, {} failed.",
                    result.imported_count, result.skipped_count, result.failed_count
                );
                self.load_titles()
            }
            Message::Displayed(Ok(displayed)) => {
                self.current = Some(displayed);
                Task::none()
            }
            Message::Closed(Ok(title)) => {
                if self.current_title().as_deref() == Some(title.as_str()) {
                    self.current = None;
                }
                self.status = format!("Closed {}.", title);
                Task::none()
            }
            Message::Deleted(Ok(title)) => {
                if self.current_title().as_deref() == Some(title.as_str()) {
                    self.current = None;
                }
                self.thumbnails.remove(&title);
                self.status = format!("Deleted {} from the library.", title);
                self.load_titles()
            }
            Message::TitlesLoaded(Err(e))
            | Message::MissingChecked(Err(e))
            | Message::Opened(Err(e))
            | Message::ImportComplete(Err(e))
            | Message::Displayed(Err(e))
            | Message::Closed(Err(e))
            | Message::Deleted(Err(e)) => {
                self.status = e;
                Task::none()
            }
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let toolbar = row![
            button("Open").on_press(Message::OpenArchive).padding(10),
            button("Import Folder").on_press(Message::ImportFolder).padding(10),
            button("Quit").on_press(Message::Quit).padding(10),
        ]
        .spacing(10);

        let library = self.titles.iter().fold(Column::new().spacing(10), |list, title| {
            let mut entry = Column::new().spacing(4).align_x(Alignment::Center);
            if let Some(thumbnail) = self.thumbnails.get(title) {
                entry = entry.push(widget::image(thumbnail.clone()).width(Length::Fixed(128.0)));
            }
            entry = entry.push(text(title.as_str()).size(14));
            list.push(button(entry).on_press(Message::Select(title.clone())))
        });

        let reader: Element<Message> = match &self.current {
            Some((comic, page)) => column![
                text(format!(
                    "{} - page {} of {}",
                    comic.title,
                    comic.current_page + 1,
                    comic.page_count
                ))
                .size(18),
                text(format!(
                    "{} | added {} | last read page {}",
                    comic.source_path.display(),
                    comic.added_at.format("%Y-%m-%d"),
                    comic.last_page_read + 1
                ))
                .size(12),
                row![
                    button("First").on_press(Message::Navigate(Navigation::First)),
                    button("Previous").on_press(Message::Navigate(Navigation::Previous)),
                    button("Next").on_press(Message::Navigate(Navigation::Next)),
                    button("Last").on_press(Message::Navigate(Navigation::Last)),
                    text_input("Page", &self.page_input)
                        .on_input(Message::PageInput)
                        .on_submit(Message::GoToPage)
                        .width(Length::Fixed(80.0)),
                    button("Close").on_press(Message::Close),
                    button("Delete").on_press(Message::Delete),
                ]
                .spacing(10),
                scrollable(widget::image(page.clone()).width(Length::Fill)),
            ]
            .spacing(10)
            .into(),
            None => text("Open a comic or pick one from the library.").into(),
        };

        let content = row![
            container(scrollable(library)).width(Length::Fixed(180.0)),
            container(reader).width(Length::Fill),
        ]
        .spacing(20);

        column![toolbar, content, text(&self.status).size(14)]
            .spacing(20)
            .padding(20)
            .into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn current_title(&self) -> Option<String> {
        self.current.as_ref().map(|(comic, _)| comic.title.clone())
    }

    fn load_titles(&self) -> Task<Message> {
        let library = self.library.clone();
        Task::perform(
            async move { library.list_titles().await.map_err(|e| e.to_string()) },
            Message::TitlesLoaded,
        )
    }

    fn check_missing(&self) -> Task<Message> {
        let library = self.library.clone();
        Task::perform(
            async move { library.missing_sources().await.map_err(|e| e.to_string()) },
            Message::MissingChecked,
        )
    }

    fn load_thumbnail(&self, title: String) -> Task<Message> {
        let library = self.library.clone();
        Task::perform(
            async move {
                let result = library
                    .thumbnail(title.clone())
                    .await
                    .map(|thumbnail| to_handle(&thumbnail))
                    .map_err(|e| e.to_string());
                (title, result)
            },
            |(title, result)| Message::ThumbnailLoaded(title, result),
        )
    }
}

/// Fetch what is needed to draw a comic's current page
async fn display(library: &LibraryHandle, title: String) -> Result<Displayed, String> {
    let comic = library.get_comic(title.clone()).await.map_err(|e| e.to_string())?;
    let page = library
        .current_page_image(title)
        .await
        .map_err(|e| e.to_string())?;
    Ok((comic, to_handle(&page)))
}

/// Transient, render-only copy of a page
fn to_handle(page: &image::DynamicImage) -> ImageHandle {
    let rgba = page.to_rgba8();
    ImageHandle::from_rgba(rgba.width(), rgba.height(), rgba.into_raw())
}

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("comic_reader=info")),
        )
        .init();

    let config = match config::ReaderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    // The library worker runs on its own runtime, independent of the UI executor
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "could not start the library worker runtime");
            std::process::exit(1);
        }
    };

    let store = LibraryStore::new(&config.library_path);
    let manager = LibraryManager::load(store, config.page_cache_capacity);
    tracing::info!(
        comics = manager.library().len(),
        store = %manager.store().path().display(),
        "comic reader initialized"
    );
    if manager.library().is_empty() {
        tracing::info!("library is empty, open an archive or import a folder to begin");
    }

    let library = {
        let _guard = runtime.enter();
        LibraryHandle::spawn(manager)
    };
    let shutdown = library.clone();

    let result = iced::application("Comic Reader", ComicReader::update, ComicReader::view)
        .theme(ComicReader::theme)
        .centered()
        .run_with(move || ComicReader::new(library));

    // Quit or window close: record every open comic's position
    if let Err(e) = runtime.block_on(shutdown.close_all()) {
        tracing::error!(error = %e, "could not save reading positions on exit");
    }

    result
}
