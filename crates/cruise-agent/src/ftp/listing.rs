//! C2 listing algorithm: a lazy, non-restartable traversal of
//! `/year/month/line/ship/*.json` that yields [`FileInfo`] items one at a
//! time so workers can start before discovery finishes (§4.2).

use chrono::{DateTime, Datelike, Utc};

use super::control::ControlClient;
use super::FtpError;

#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: String,
    pub name: String,
    pub size: i64,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub line_id: Option<String>,
    pub ship_id: Option<String>,
    pub max_files: Option<usize>,
    pub include_historical: bool,
}

const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

/// Discovers the years to traverse: the caller's filter if given, otherwise
/// the FTP root's numeric subdirectories clamped to `[max(2000, now), 2100]`,
/// falling back to `[now, now+1]` if discovery comes back empty (§4.2 step 1).
async fn discover_years(client: &ControlClient, filter: &ListingFilter, now: i32) -> Result<Vec<i32>, FtpError> {
    if let Some(year) = filter.year {
        return Ok(vec![year]);
    }

    let entries = client.list_names("/").await?;
    let mut years: Vec<i32> = entries
        .iter()
        .filter_map(|e| e.parse::<i32>().ok())
        .filter(|y| *y >= now.max(MIN_YEAR) && *y <= MAX_YEAR)
        .collect();
    years.sort_unstable();
    years.dedup();

    if years.is_empty() {
        years = vec![now, now + 1];
    }
    Ok(years)
}

/// Public wrapper over [`discover_years`] for the control surface's
/// available-years endpoint (§6.3).
pub async fn available_years(client: &ControlClient) -> Result<Vec<i32>, FtpError> {
    discover_years(client, &ListingFilter::default(), Utc::now().year()).await
}

async fn list_numeric(client: &ControlClient, dir: &str) -> Result<Vec<u32>, FtpError> {
    let entries = client.list_names(dir).await?;
    let mut values: Vec<u32> = entries.iter().filter_map(|e| e.parse::<u32>().ok()).collect();
    values.sort_unstable();
    Ok(values)
}

/// Streams [`FileInfo`] entries by descending year → month → line → ship →
/// file, checking `cancelled` between every level (§4.2 steps 2-5).
pub struct Listing<'a> {
    client: &'a ControlClient,
    filter: ListingFilter,
    now_year: i32,
    now_month: u32,
    yielded: usize,
}

impl<'a> Listing<'a> {
    pub fn new(client: &'a ControlClient, filter: ListingFilter) -> Self {
        let now = Utc::now();
        Listing {
            client,
            filter,
            now_year: now.year(),
            now_month: now.month(),
            yielded: 0,
        }
    }

    /// Pulls entries one directory level at a time, calling `on_file` for
    /// each discovered `.json` entry and `cancelled` between levels. This is
    /// the lazy, non-restartable traversal: it does not build a materialized
    /// list before returning.
    pub async fn drive<F, C>(&mut self, mut on_file: F, mut cancelled: C) -> Result<(), FtpError>
    where
        F: FnMut(FileInfo) -> bool,
        C: FnMut() -> bool,
    {
        let years = discover_years(self.client, &self.filter, self.now_year).await?;

        'years: for year in years {
            if cancelled() {
                break;
            }
            let months = match &self.filter.month {
                Some(m) => vec![*m],
                None => list_numeric(self.client, &format!("/{year}")).await?,
            };

            for month in months {
                if cancelled() {
                    break 'years;
                }
                if !self.filter.include_historical
                    && (year < self.now_year || (year == self.now_year && month < self.now_month))
                {
                    continue;
                }

                let month_dir = format!("/{year}/{month:02}");
                let lines = self.client.list_names(&month_dir).await?;
                for line in lines {
                    if cancelled() {
                        break 'years;
                    }
                    if let Some(want) = &self.filter.line_id {
                        if &line != want {
                            continue;
                        }
                    }

                    let line_dir = format!("{month_dir}/{line}");
                    let ships = self.client.list_names(&line_dir).await?;
                    for ship in ships {
                        if cancelled() {
                            break 'years;
                        }
                        if let Some(want) = &self.filter.ship_id {
                            if &ship != want {
                                continue;
                            }
                        }

                        let ship_dir = format!("{line_dir}/{ship}");
                        let files = self.client.list_names(&ship_dir).await?;
                        for name in files {
                            if !name.ends_with(".json") {
                                continue;
                            }
                            let path = format!("{ship_dir}/{name}");
                            let size = self.client.size(&path).await?.unwrap_or(0) as i64;
                            let modified_at = self.client.modified_at(&path).await?;
                            let info = FileInfo {
                                path,
                                name,
                                size,
                                modified_at,
                            };
                            let keep_going = on_file(info);
                            self.yielded += 1;
                            if !keep_going {
                                break 'years;
                            }
                            if let Some(max) = self.filter.max_files {
                                if self.yielded >= max {
                                    break 'years;
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn file_info_equality_is_by_field() {
        let a = FileInfo {
            path: "/2026/03/1/1/1.json".into(),
            name: "1.json".into(),
            size: 10,
            modified_at: None,
        };
        let b = a.clone();
        assert_eq!(a, b);
    }
}
