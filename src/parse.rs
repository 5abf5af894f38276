use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::types::{GameDate, GameId, HockeyTime, PlayEvent, PlayKind, TeamCode};

const PBP_LIST: &str = "ul.gametracker-list.gametracker-list--play-by-play";
const END_OF_MARKER: &str = "End of";
const PLAY_CELLS: usize = 5;
const TEAM_CELL: usize = 2;
const CLOCK_CELL: usize = 3;
const DESCRIPTION_CELL: usize = 4;

const SCHEDULE_TABLE: &str = "div#TableBase";
const SCHEDULE_ROW: &str = "tr.TableBase-bodyTr";
const SCHEDULE_CELL: &str = "td.TableBase-bodyTd";

/// Extracts goals, shots, face-offs and period ends from a play-by-play page.
///
/// The page lists plays newest first, one `li` per play, with the end of each
/// period as its own row. Nothing before the first end-of-period row is read.
/// The result is oldest first with periods numbered from 1. A page without
/// the play-by-play list yields no events. An unreadable clock fails the
/// whole page, and so does a list of plays with no end-of-period row.
pub fn parse_play_by_play(game: &GameId, html: &str) -> Result<Vec<PlayEvent>> {
    let document = Html::parse_document(html);
    let list_sel = selector(PBP_LIST)?;
    let row_sel = selector("li")?;
    let cell_sel = selector("span")?;

    let mut started = false;
    let mut saw_plays = false;
    let mut period = 0i32;
    let mut scanned = Vec::new();

    for list in document.select(&list_sel) {
        for row in list.select(&row_sel) {
            let cells = row.select(&cell_sel).map(text_of).collect::<Vec<_>>();

            if cells.last().is_some_and(|cell| cell.trim() == END_OF_MARKER) {
                if started {
                    period -= 1;
                } else {
                    started = true;
                }
                scanned.push(PlayEvent::end_of_period(game.clone(), period));
                continue;
            }

            if cells.len() != PLAY_CELLS {
                continue;
            }
            saw_plays = true;
            if !started {
                continue;
            }

            let time = HockeyTime::parse(period, &cells[CLOCK_CELL])?;
            let Some(kind) = classify(&cells[DESCRIPTION_CELL]) else {
                continue;
            };
            scanned.push(PlayEvent {
                game: game.clone(),
                time,
                kind,
                team: Some(cells[TEAM_CELL].trim().to_string()),
            });
        }
    }

    if saw_plays && !started {
        return Err(IngestError::ParseFailure(format!(
            "play-by-play for {game} has plays but no \"{END_OF_MARKER}\" row"
        )));
    }

    // Counters run 0, -1, ..., -(n-1) from the last period back to the first.
    let shift = 1 - period;
    Ok(scanned
        .into_iter()
        .rev()
        .map(|mut event| {
            event.time.period += shift;
            event
        })
        .collect())
}

/// `GOAL` is matched case-sensitively and wins over the other kinds.
pub fn classify(description: &str) -> Option<PlayKind> {
    if description.contains("GOAL") {
        return Some(PlayKind::Goal);
    }
    let lowered = description.to_lowercase();
    if lowered.contains("faceoff") {
        Some(PlayKind::FaceOff)
    } else if lowered.contains("shot") {
        Some(PlayKind::Shot)
    } else {
        None
    }
}

/// Lists the games on a schedule page. Rows missing either team link are
/// skipped; a page without the schedule table has no games.
pub fn parse_schedule(date: GameDate, html: &str) -> Result<Vec<GameId>> {
    let document = Html::parse_document(html);
    let table_sel = selector(SCHEDULE_TABLE)?;
    let row_sel = selector(SCHEDULE_ROW)?;
    let cell_sel = selector(SCHEDULE_CELL)?;
    let link_sel = selector("a")?;

    let Some(table) = document.select(&table_sel).next() else {
        return Ok(Vec::new());
    };

    let mut games = Vec::new();
    for (idx, row) in table.select(&row_sel).enumerate() {
        let mut cells = row.select(&cell_sel);
        let away = cells.next().and_then(|cell| team_in_cell(cell, &link_sel));
        let home = cells.next().and_then(|cell| team_in_cell(cell, &link_sel));
        match (away, home) {
            (Some(away), Some(home)) => games.push(GameId::new(date, away, home)),
            _ => debug!(date, row = idx, "skipping schedule row without both teams"),
        }
    }
    Ok(games)
}

fn team_in_cell(cell: ElementRef<'_>, link_sel: &Selector) -> Option<TeamCode> {
    let href = cell.select(link_sel).next()?.value().attr("href")?;
    team_from_href(href)
}

/// `/nhl/teams/BOS/boston-bruins/` -> `BOS`.
pub fn team_from_href(href: &str) -> Option<TeamCode> {
    let (_, rest) = href.split_once("teams/")?;
    let code = rest.split('/').next()?.trim();
    if code.is_empty() {
        return None;
    }
    Some(code.to_string())
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect()
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|err| IngestError::ParseFailure(format!("selector {css}: {err:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(team: &str, clock: &str, description: &str) -> String {
        format!(
            "<li><span>icon</span><span>x</span><span>{team}</span><span>{clock}</span><span>{description}</span></li>"
        )
    }

    fn end_row() -> String {
        "<li><span>End of </span></li>".to_string()
    }

    fn page(rows: &[String]) -> String {
        format!(
            "<html><body><ul class=\"gametracker-list gametracker-list--play-by-play\">{}</ul></body></html>",
            rows.concat()
        )
    }

    #[test]
    fn goal_beats_shot() {
        assert_eq!(classify("GOAL scored on shot"), Some(PlayKind::Goal));
        assert_eq!(classify("goal scored on shot"), Some(PlayKind::Shot));
        assert_eq!(classify("Faceoff won by BOS"), Some(PlayKind::FaceOff));
        assert_eq!(classify("Penalty to BOS"), None);
    }

    #[test]
    fn remaps_periods_to_ascending() {
        let game = GameId::new(20181004, "BOS", "WAS");
        let html = page(&[
            end_row(),
            row("WAS", "15:00", "Shot by Ovechkin"),
            end_row(),
            row("BOS", "10:00", "GOAL by Pastrnak"),
            end_row(),
            row("BOS", "05:00", "Faceoff won"),
        ]);
        let events = parse_play_by_play(&game, &html).expect("parses");
        let periods = events.iter().map(|e| e.time.period).collect::<Vec<_>>();
        assert_eq!(periods, vec![1, 1, 2, 2, 3, 3]);
        assert_eq!(events[0].kind, PlayKind::FaceOff);
        assert_eq!(events[1].kind, PlayKind::EndOfPeriod);
        assert_eq!(events[5].kind, PlayKind::EndOfPeriod);
        assert!(events.windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn ignores_rows_before_first_period_end() {
        let game = GameId::new(20181004, "BOS", "WAS");
        let html = page(&[
            row("WAS", "not a clock", "Shot"),
            end_row(),
            row("WAS", "01:00", "Shot"),
        ]);
        let events = parse_play_by_play(&game, &html).expect("preamble skipped");
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn malformed_clock_fails_whole_page() {
        let game = GameId::new(20181004, "BOS", "WAS");
        let html = page(&[end_row(), row("WAS", "1:00", "Shot"), row("WAS", "??", "Shot")]);
        assert!(matches!(
            parse_play_by_play(&game, &html),
            Err(IngestError::MalformedTime(_))
        ));
    }

    #[test]
    fn missing_list_is_empty() {
        let game = GameId::new(20181004, "BOS", "WAS");
        let events = parse_play_by_play(&game, "<html><body><p>soon</p></body></html>")
            .expect("empty page parses");
        assert!(events.is_empty());
    }

    #[test]
    fn plays_without_period_end_fail() {
        let game = GameId::new(20181004, "BOS", "WAS");
        let html = page(&[row("WAS", "01:00", "GOAL by Wilson"), row("BOS", "02:00", "Shot")]);
        assert!(matches!(
            parse_play_by_play(&game, &html),
            Err(IngestError::ParseFailure(_))
        ));
    }

    #[test]
    fn team_code_comes_from_href() {
        assert_eq!(
            team_from_href("/nhl/teams/BOS/boston-bruins/").as_deref(),
            Some("BOS")
        );
        assert_eq!(team_from_href("/nhl/teams/").as_deref(), None);
        assert_eq!(team_from_href("/nhl/players/123/").as_deref(), None);
    }
}
