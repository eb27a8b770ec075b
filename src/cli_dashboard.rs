//! Terminal view of a running tunesmith API server.
//!
//! Jobs (running and recent jobs with progress)
//! Failures (failed jobs with their error messages)

use std::{
  env,
  error::Error,
  io,
  thread,
  time::{Duration, Instant},
};

use crossterm::{
  event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyCode},
  execute,
  terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use tui::{
  backend::{Backend, CrosstermBackend},
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Span, Spans},
  widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Tabs},
  Terminal,
};
use tokio::runtime::Runtime;
use tunesmith::models::{JobRecord, JobStatus};

const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone, Copy)]
enum DashboardTab {
  Jobs,
  Failures,
}

struct App {
  current_tab: DashboardTab,
  jobs: Vec<JobRecord>,
  connection_error: Option<String>,
}

impl App {
  fn new() -> Self {
    Self {
      current_tab: DashboardTab::Jobs,
      jobs: vec![],
      connection_error: None,
    }
  }

  fn next_tab(&mut self) {
    self.current_tab = match self.current_tab {
      DashboardTab::Jobs => DashboardTab::Failures,
      DashboardTab::Failures => DashboardTab::Jobs,
    }
  }

  fn running(&self) -> impl Iterator<Item = &JobRecord> {
    self.jobs.iter().filter(|j| j.state == JobStatus::Running)
  }

  fn failed(&self) -> impl Iterator<Item = &JobRecord> {
    self.jobs.iter().filter(|j| j.state == JobStatus::Failed)
  }
}

async fn fetch_jobs(client: &reqwest::Client, api_url: &str) -> Result<Vec<JobRecord>, reqwest::Error> {
  client
    .get(format!("{}/jobs", api_url.trim_end_matches('/')))
    .timeout(Duration::from_secs(5))
    .send()
    .await?
    .error_for_status()?
    .json()
    .await
}

fn main() -> Result<(), Box<dyn Error>> {
  dotenvy::dotenv().ok();
  let api_url = env::var("DASHBOARD_API_URL").unwrap_or_else(|_| "http://127.0.0.1:5001".into());

  enable_raw_mode()?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
  let backend = CrosstermBackend::new(stdout);
  let mut terminal = Terminal::new(backend)?;

  let (tx, rx) = std::sync::mpsc::channel::<Result<Vec<JobRecord>, String>>();
  let rt = Runtime::new()?;
  thread::spawn(move || {
    let client = reqwest::Client::new();
    loop {
      let update = rt.block_on(fetch_jobs(&client, &api_url)).map_err(|e| e.to_string());
      if tx.send(update).is_err() {
        break;
      }
      thread::sleep(REFRESH_INTERVAL);
    }
  });

  let mut app = App::new();
  let tick_rate = Duration::from_millis(500);
  let mut last_tick = Instant::now();

  loop {
    while let Ok(update) = rx.try_recv() {
      match update {
        Ok(jobs) => {
          app.jobs = jobs;
          app.connection_error = None;
        }
        Err(e) => app.connection_error = Some(e),
      }
    }
    terminal.draw(|f| ui(f, &app))?;

    let timeout = tick_rate
      .checked_sub(last_tick.elapsed())
      .unwrap_or_else(|| Duration::from_secs(0));
    if event::poll(timeout)? {
      if let CEvent::Key(key) = event::read()? {
        match key.code {
          KeyCode::Char('q') => break,
          KeyCode::Right | KeyCode::Left | KeyCode::Tab => app.next_tab(),
          _ => {}
        }
      }
    }
    if last_tick.elapsed() >= tick_rate {
      last_tick = Instant::now();
    }
  }

  disable_raw_mode()?;
  execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
  terminal.show_cursor()?;
  Ok(())
}

fn ui<B: Backend>(f: &mut tui::Frame<B>, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .margin(1)
    .constraints([
      Constraint::Length(3),
      Constraint::Min(0),
      Constraint::Length(3),
    ].as_ref())
    .split(f.size());

  let failed = app.failed().count();
  let tab_titles = vec!["Jobs".to_string(), format!("Failures ({failed})")];
  let tabs = Tabs::new(
    tab_titles
      .into_iter()
      .map(|t| Spans::from(Span::styled(t, Style::default().fg(Color::Yellow))))
      .collect(),
  )
    .block(Block::default().borders(Borders::ALL).title("tunesmith"))
    .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    .select(match app.current_tab {
      DashboardTab::Jobs => 0,
      DashboardTab::Failures => 1,
    });
  f.render_widget(tabs, chunks[0]);

  match app.current_tab {
    DashboardTab::Jobs => render_jobs(f, app, chunks[1]),
    DashboardTab::Failures => render_failures(f, app, chunks[1]),
  }

  let footer_text = match &app.connection_error {
    Some(e) => format!("API unreachable: {e}"),
    None => "←/→: Switch Tabs | q: Quit".to_string(),
  };
  let footer = Paragraph::new(footer_text)
    .style(Style::default().fg(Color::White))
    .block(Block::default().borders(Borders::ALL));
  f.render_widget(footer, chunks[2]);
}

fn render_jobs<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let chunks = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
    .split(area);

  let running: Vec<&JobRecord> = app.running().collect();
  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints(
      running
        .iter()
        .map(|_| Constraint::Length(3))
        .chain(std::iter::once(Constraint::Min(0)))
        .collect::<Vec<_>>(),
    )
    .split(chunks[0]);
  if running.is_empty() {
    let idle = Paragraph::new("No running jobs")
      .block(Block::default().borders(Borders::ALL).title("Running"));
    f.render_widget(idle, chunks[0]);
  }
  for (job, row) in running.iter().zip(rows.iter()) {
    let gauge = Gauge::default()
      .block(Block::default().borders(Borders::ALL).title(format!("{} ({})", job.theme, job.style)))
      .gauge_style(Style::default().fg(Color::Green))
      .percent(u16::from(job.progress.min(100)))
      .label(job.status.clone());
    f.render_widget(gauge, *row);
  }

  let items: Vec<ListItem> = app.jobs.iter().map(|job| {
    let color = match job.state {
      JobStatus::Running => Color::Yellow,
      JobStatus::Complete => Color::Green,
      JobStatus::Failed => Color::Red,
    };
    ListItem::new(vec![
      Spans::from(Span::styled(job.theme.clone(), Style::default().fg(color).add_modifier(Modifier::BOLD))),
      Spans::from(Span::raw(format!("{} | {}% | {}", job.status, job.progress, job.created_at.format("%Y-%m-%d %H:%M:%S")))),
      Spans::from(Span::raw(job.audio_path.clone().unwrap_or_else(|| job.id.clone()))),
    ])
  }).collect();
  let list = List::new(items)
    .block(Block::default().borders(Borders::ALL).title("All Jobs"));
  f.render_widget(list, chunks[1]);
}

fn render_failures<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let items: Vec<ListItem> = app.failed().map(|job| {
    ListItem::new(vec![
      Spans::from(vec![
        Span::styled(format!("{} ", job.id), Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::raw(job.theme.clone()),
      ]),
      Spans::from(Span::styled(
        job.error_message.clone().unwrap_or_else(|| "unknown error".into()),
        Style::default().fg(Color::Red),
      )),
    ])
  }).collect();
  let list = List::new(items)
    .block(Block::default().borders(Borders::ALL).title("Failed Jobs"));
  f.render_widget(list, area);
}
