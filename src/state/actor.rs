/// Library worker task and the handle the UI talks to it through.
///
/// One task owns the LibraryManager and processes requests strictly in
/// arrival order, so commands against a title never interleave and library
/// saves land in the order the commands were issued. Archive extraction and
/// page decoding run on the blocking pool, so a bad archive can fail a
/// command but never the worker itself.
use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use tokio::sync::{mpsc, oneshot};

use super::data::{ComicSnapshot, PageImage};
use super::error::LibraryError;
use super::manager::{ImportResult, LibraryManager, PageLookup};
use crate::archive::{extractor, thumbnail};

type Reply<T> = oneshot::Sender<Result<T, LibraryError>>;

/// Navigation commands that resolve to a `set_page` with a computed index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Next,
    Previous,
    First,
    Last,
}

enum Request {
    Open { path: PathBuf, reply: Reply<ComicSnapshot> },
    Show { title: String, reply: Reply<ComicSnapshot> },
    Delete { title: String, reply: Reply<()> },
    Close { title: String, reply: Reply<()> },
    CloseAll { reply: Reply<()> },
    Navigate { title: String, to: Navigation, reply: Reply<usize> },
    GoToPageNumber { title: String, input: String, reply: Reply<usize> },
    ImportFolder { dir: PathBuf, reply: Reply<ImportResult> },
    ListTitles { reply: Reply<Vec<String>> },
    GetComic { title: String, reply: Reply<ComicSnapshot> },
    CurrentPageImage { title: String, reply: Reply<PageImage> },
    Thumbnail { title: String, reply: Reply<DynamicImage> },
    MissingSources { reply: Reply<Vec<String>> },
}

/// Cloneable handle to the library worker
#[derive(Clone)]
pub struct LibraryHandle {
    tx: mpsc::Sender<Request>,
}

impl LibraryHandle {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(manager: LibraryManager) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(LibraryWorker { manager, rx }.run());
        Self { tx }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Request) -> Result<T, LibraryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| LibraryError::ChannelClosed)?;
        rx.await.map_err(|_| LibraryError::ChannelClosed)?
    }

    pub async fn open(&self, path: PathBuf) -> Result<ComicSnapshot, LibraryError> {
        self.request(|reply| Request::Open { path, reply }).await
    }

    pub async fn show(&self, title: String) -> Result<ComicSnapshot, LibraryError> {
        self.request(|reply| Request::Show { title, reply }).await
    }

    pub async fn delete(&self, title: String) -> Result<(), LibraryError> {
        self.request(|reply| Request::Delete { title, reply }).await
    }

    pub async fn close(&self, title: String) -> Result<(), LibraryError> {
        self.request(|reply| Request::Close { title, reply }).await
    }

    pub async fn close_all(&self) -> Result<(), LibraryError> {
        self.request(|reply| Request::CloseAll { reply }).await
    }

    pub async fn navigate(&self, title: String, to: Navigation) -> Result<usize, LibraryError> {
        self.request(|reply| Request::Navigate { title, to, reply }).await
    }

    pub async fn go_to_page_number(&self, title: String, input: String) -> Result<usize, LibraryError> {
        self.request(|reply| Request::GoToPageNumber { title, input, reply }).await
    }

    pub async fn import_folder(&self, dir: PathBuf) -> Result<ImportResult, LibraryError> {
        self.request(|reply| Request::ImportFolder { dir, reply }).await
    }

    pub async fn list_titles(&self) -> Result<Vec<String>, LibraryError> {
        self.request(|reply| Request::ListTitles { reply }).await
    }

    pub async fn get_comic(&self, title: String) -> Result<ComicSnapshot, LibraryError> {
        self.request(|reply| Request::GetComic { title, reply }).await
    }

    pub async fn current_page_image(&self, title: String) -> Result<PageImage, LibraryError> {
        self.request(|reply| Request::CurrentPageImage { title, reply }).await
    }

    pub async fn thumbnail(&self, title: String) -> Result<DynamicImage, LibraryError> {
        self.request(|reply| Request::Thumbnail { title, reply }).await
    }

    pub async fn missing_sources(&self) -> Result<Vec<String>, LibraryError> {
        self.request(|reply| Request::MissingSources { reply }).await
    }
}

struct LibraryWorker {
    manager: LibraryManager,
    rx: mpsc::Receiver<Request>,
}

impl LibraryWorker {
    async fn run(mut self) {
        while let Some(request) = self.rx.recv().await {
            self.handle(request).await;
        }
        tracing::debug!("library worker stopped");
    }

    // Send errors are ignored: the caller may have dropped its receiver.
    async fn handle(&mut self, request: Request) {
        match request {
            Request::Open { path, reply } => {
                let _ = reply.send(self.open(path).await);
            }
            Request::Show { title, reply } => {
                let _ = reply.send(self.manager.show(&title).map(|c| c.snapshot()));
            }
            Request::Delete { title, reply } => {
                let _ = reply.send(self.manager.delete(&title));
            }
            Request::Close { title, reply } => {
                let _ = reply.send(self.manager.close(&title));
            }
            Request::CloseAll { reply } => {
                let _ = reply.send(self.manager.close_all());
            }
            Request::Navigate { title, to, reply } => {
                let result = match to {
                    Navigation::Next => self.manager.next(&title),
                    Navigation::Previous => self.manager.previous(&title),
                    Navigation::First => self.manager.first(&title),
                    Navigation::Last => self.manager.last(&title),
                };
                let _ = reply.send(result);
            }
            Request::GoToPageNumber { title, input, reply } => {
                let _ = reply.send(self.manager.go_to_page_number(&title, &input));
            }
            Request::ImportFolder { dir, reply } => {
                let _ = reply.send(self.import_folder(dir).await);
            }
            Request::ListTitles { reply } => {
                let _ = reply.send(Ok(self.manager.list_titles()));
            }
            Request::GetComic { title, reply } => {
                let _ = reply.send(self.manager.get_comic(&title).map(|c| c.snapshot()));
            }
            Request::CurrentPageImage { title, reply } => {
                let _ = reply.send(self.current_page_image(&title).await);
            }
            Request::Thumbnail { title, reply } => {
                let _ = reply.send(self.thumbnail(&title).await);
            }
            Request::MissingSources { reply } => {
                let _ = reply.send(Ok(self.manager.missing_sources()));
            }
        }
    }

    /// Validate, extract off the worker, then insert. Nothing is inserted
    /// until extraction has finished successfully.
    async fn open(&mut self, path: PathBuf) -> Result<ComicSnapshot, LibraryError> {
        self.manager.check_openable(&path)?;

        let source = path.clone();
        let pages = blocking(move || extractor::extract(&source)).await?;

        self.manager
            .insert_extracted(&path, pages)
            .map(|comic| comic.snapshot())
    }

    /// Open every comic archive found below `dir`, one at a time.
    async fn import_folder(&mut self, dir: PathBuf) -> Result<ImportResult, LibraryError> {
        let candidates = blocking(move || Ok(extractor::scan_folder(&dir))).await?;

        let mut result = ImportResult::default();
        for path in candidates {
            let shown_path = path.display().to_string();
            match self.open(path).await {
                Ok(_) => result.imported_count += 1,
                Err(LibraryError::DuplicateTitle(_)) => result.skipped_count += 1,
                Err(e) => {
                    tracing::warn!(path = %shown_path, error = %e, "import failed");
                    result.failed_count += 1;
                }
            }
        }

        tracing::info!(
            imported = result.imported_count,
            skipped = result.skipped_count,
            failed = result.failed_count,
            "folder import complete"
        );
        Ok(result)
    }

    async fn current_page_image(&mut self, title: &str) -> Result<PageImage, LibraryError> {
        let current = self.manager.get_comic(title)?.current_page();
        self.page_image(title, current).await
    }

    /// Cover (first page) of a comic, scaled down for the library list.
    async fn thumbnail(&mut self, title: &str) -> Result<DynamicImage, LibraryError> {
        let cover = self.page_image(title, 0).await?;
        blocking(move || Ok(thumbnail::cover_thumbnail(&cover))).await
    }

    async fn page_image(&mut self, title: &str, index: usize) -> Result<PageImage, LibraryError> {
        match self.manager.locate_page(title, index)? {
            PageLookup::Loaded(image) => Ok(image),
            PageLookup::Archive { source, entry } => {
                let image = Arc::new(blocking(move || extractor::read_page(&source, &entry)).await?);
                self.manager.cache_page(title, index, Arc::clone(&image));
                Ok(image)
            }
        }
    }
}

/// Run decoding work on the blocking pool. A panic inside `job` comes back
/// as `TaskFailed` instead of unwinding the worker.
async fn blocking<T, F>(job: F) -> Result<T, LibraryError>
where
    F: FnOnce() -> Result<T, LibraryError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| LibraryError::TaskFailed(e.to_string()))?
}
