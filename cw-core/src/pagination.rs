use std::any::type_name;
use std::future::Future;

use anyhow::Result;
use tracing::{event, trace_span, warn, Instrument, Level};

/// One page of a paginated listing plus the total page count the server
/// reported for it (the `X-Pages` header).
#[derive(Debug, Clone)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pages: u32,
}

/// Safety valves against pathological catalog responses. Exceeding either
/// ceiling truncates the result with a warning instead of erroring.
#[derive(Debug, Clone)]
pub struct PageLimits {
    pub max_pages: u32,
    pub max_records: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            max_pages: 200,
            max_records: 150_000,
        }
    }
}

pub async fn fetch_all_pages<T, F, Fut>(mut fetch_page: F, limits: PageLimits) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PaginatedResponse<T>>>,
{
    let output_parameter_type_name = type_name::<T>();

    let span = trace_span!("pagination");

    async move {
        event!(Level::TRACE, "Start downloading all pages of type {}", output_parameter_type_name);

        let mut all_data = Vec::new();
        let mut current_page = 1;
        let mut total_number_of_pages = 1;

        while current_page <= total_number_of_pages {
            if current_page > limits.max_pages {
                warn!(
                    "Truncating catalog download after {} of {} pages (page ceiling)",
                    limits.max_pages, total_number_of_pages
                );
                break;
            }

            let response = fetch_page(current_page).await?;
            total_number_of_pages = response.pages;

            event!(Level::TRACE, "Downloaded page {} of {}", current_page, total_number_of_pages);

            all_data.extend(response.data);

            if all_data.len() > limits.max_records {
                warn!(
                    "Truncating catalog download at {} records on page {} (record ceiling)",
                    limits.max_records, current_page
                );
                all_data.truncate(limits.max_records);
                break;
            }

            current_page += 1;
        }

        event!(Level::TRACE, "Done downloading {} records", all_data.len());
        Ok(all_data)
    }
    .instrument(span)
    .await
}
