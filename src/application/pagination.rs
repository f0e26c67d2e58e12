//! Page-number pagination shared by every feed.

use std::num::NonZeroU32;

use serde::Deserialize;

/// Page size used when configuration does not override it.
pub const DEFAULT_PER_PAGE: u32 = 10;

/// Query-string shape accepted by paginated routes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn requested(&self) -> RequestedPage {
        RequestedPage::parse(self.page.as_deref())
    }
}

/// A requested page number after lower-bound normalisation.
///
/// Missing, non-numeric, zero and negative inputs all become page 1. The upper
/// bound is only known once the feed has been counted, see [`PageWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestedPage(NonZeroU32);

impl RequestedPage {
    pub const FIRST: Self = Self(NonZeroU32::MIN);

    pub fn parse(raw: Option<&str>) -> Self {
        raw.map(str::trim)
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(|value| u32::try_from(value).ok())
            .and_then(NonZeroU32::new)
            .map(Self)
            .unwrap_or(Self::FIRST)
    }

    pub fn new(page: u32) -> Self {
        NonZeroU32::new(page).map(Self).unwrap_or(Self::FIRST)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for RequestedPage {
    fn default() -> Self {
        Self::FIRST
    }
}

/// The resolved slice of a feed once the total count is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_count: u64,
    pub per_page: u32,
}

impl PageWindow {
    /// Clamp `requested` into `1..=total_pages`.
    ///
    /// An empty feed has exactly one (empty) page.
    pub fn compute(total_count: u64, per_page: NonZeroU32, requested: RequestedPage) -> Self {
        let per_page = per_page.get();
        let pages = total_count.div_ceil(u64::from(per_page)).max(1);
        let total_pages = u32::try_from(pages).unwrap_or(u32::MAX);
        let current_page = requested.get().min(total_pages);

        Self {
            current_page,
            total_pages,
            total_count,
            per_page,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.current_page - 1) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u32 {
        self.per_page
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn previous_page(&self) -> Option<u32> {
        self.has_previous().then(|| self.current_page - 1)
    }

    pub fn next_page(&self) -> Option<u32> {
        self.has_next().then(|| self.current_page + 1)
    }
}

/// One page of items plus its window.
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub window: PageWindow,
}

/// Count, clamp, then fetch the slice through the supplied closures.
pub async fn paginate<T, E, C, CF, F, FF>(
    per_page: NonZeroU32,
    requested: RequestedPage,
    count: C,
    fetch: F,
) -> Result<Paginated<T>, E>
where
    C: FnOnce() -> CF,
    CF: Future<Output = Result<u64, E>>,
    F: FnOnce(u64, u32) -> FF,
    FF: Future<Output = Result<Vec<T>, E>>,
{
    let total = count().await?;
    let window = PageWindow::compute(total, per_page, requested);
    let items = if total == 0 {
        Vec::new()
    } else {
        fetch(window.offset(), window.limit()).await?
    };

    Ok(Paginated { items, window })
}
