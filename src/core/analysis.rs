use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::alerts::{derive_alerts, AlertKind, AlertLevel, AlertReport};
use super::config::{RagThresholds, Settings};
use super::model::{Task, TeamMember};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    pub total: usize,
    pub done: usize,
    pub active: usize,
    pub overdue: usize,
    pub blocked: usize,
    pub due_soon: usize,
    /// Mean progress of open tasks, percent
    pub avg_progress: f64,
    /// Estimated hours left on open tasks
    pub remaining_hours: f64,
    /// Mean days from start to completion of finished tasks
    pub avg_completion_days: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RagBand {
    Green,
    Yellow,
    Orange,
    Red,
}

impl RagBand {
    pub fn classify(utilization: f64, thresholds: &RagThresholds) -> Self {
        if utilization <= thresholds.green {
            Self::Green
        } else if utilization <= thresholds.yellow {
            Self::Yellow
        } else if utilization <= thresholds.orange {
            Self::Orange
        } else {
            Self::Red
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberLoad {
    pub id: String,
    pub name: String,
    pub role: String,
    pub capacity: f64,
    pub remaining_hours: f64,
    /// Remaining hours as a percentage of weekly capacity
    pub utilization: f64,
    pub band: RagBand,
    pub open_tasks: usize,
    pub overdue_tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WipUsage {
    pub status: String,
    pub count: usize,
    pub limit: u32,
    pub exceeded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub date: NaiveDate,
    pub kpis: Kpis,
    pub workload: Vec<MemberLoad>,
    pub wip: Vec<WipUsage>,
    /// Open tasks per displayed alert level
    pub alert_levels: BTreeMap<String, usize>,
}

fn level_name(level: AlertLevel) -> String {
    serde_json::to_value(level)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn compute_kpis(tasks: &[Task], reports: &[AlertReport], settings: &Settings) -> Kpis {
    let done_status = settings.done_status();
    let open: Vec<&Task> = tasks.iter().filter(|t| !t.is_done(done_status)).collect();

    let has = |kind: AlertKind| reports.iter().filter(|r| r.find(kind).is_some()).count();

    let progress: Vec<f64> = open.iter().map(|t| f64::from(t.progress)).collect();
    let completion_days: Vec<f64> = tasks
        .iter()
        .filter(|t| t.is_done(done_status))
        .filter_map(|t| Some((t.completed_date? - t.start?).num_days().max(0) as f64))
        .collect();

    Kpis {
        total: tasks.len(),
        done: tasks.len() - open.len(),
        active: open.len(),
        overdue: has(AlertKind::Overdue),
        blocked: open
            .iter()
            .filter(|t| t.status == settings.workflow.blocked)
            .count(),
        due_soon: has(AlertKind::DeadlineSoon),
        avg_progress: mean(&progress).unwrap_or(0.0),
        remaining_hours: open.iter().map(|t| t.remaining_hours()).sum(),
        avg_completion_days: mean(&completion_days),
    }
}

pub fn compute_workload(
    tasks: &[Task],
    team: &[TeamMember],
    reports: &[AlertReport],
    settings: &Settings,
) -> Vec<MemberLoad> {
    let done_status = settings.done_status();
    team.iter()
        .map(|member| {
            let mut remaining = 0.0;
            let mut open_tasks = 0;
            let mut overdue_tasks = 0;
            for (task, report) in tasks.iter().zip(reports) {
                if task.assignee != member.name || task.is_done(done_status) {
                    continue;
                }
                open_tasks += 1;
                remaining += task.remaining_hours();
                if report.find(AlertKind::Overdue).is_some() {
                    overdue_tasks += 1;
                }
            }
            let utilization = if member.hours > 0.0 {
                remaining / member.hours * 100.0
            } else {
                0.0
            };
            MemberLoad {
                id: member.id.clone(),
                name: member.name.clone(),
                role: member.role.clone(),
                capacity: member.hours,
                remaining_hours: remaining,
                utilization,
                band: RagBand::classify(utilization, &settings.rag_thresholds),
                open_tasks,
                overdue_tasks,
            }
        })
        .collect()
}

/// Usage of every status that has a WIP limit, in status order.
pub fn compute_wip(tasks: &[Task], settings: &Settings) -> Vec<WipUsage> {
    settings
        .statuses
        .iter()
        .filter_map(|status| {
            let limit = settings.wip_limit(status)?;
            let count = tasks.iter().filter(|t| &t.status == status).count();
            Some(WipUsage {
                status: status.clone(),
                count,
                limit,
                exceeded: count > limit as usize,
            })
        })
        .collect()
}

pub fn compute_dashboard(
    tasks: &[Task],
    team: &[TeamMember],
    settings: &Settings,
    today: NaiveDate,
) -> DashboardSummary {
    let reports: Vec<AlertReport> = tasks
        .iter()
        .map(|t| derive_alerts(t, today, &settings.workflow))
        .collect();

    let mut alert_levels = BTreeMap::new();
    for (task, report) in tasks.iter().zip(&reports) {
        if !task.is_done(settings.done_status()) {
            *alert_levels.entry(level_name(report.level)).or_insert(0) += 1;
        }
    }

    DashboardSummary {
        date: today,
        kpis: compute_kpis(tasks, &reports, settings),
        workload: compute_workload(tasks, team, &reports, settings),
        wip: compute_wip(tasks, settings),
        alert_levels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()
    }

    fn task(id: &str, assignee: &str, status: &str, due: &str, est: f64, progress: u8) -> Task {
        serde_json::from_value(json!({
            "id": id,
            "name": id,
            "assignee": assignee,
            "status": status,
            "priority": "Medium",
            "start": "2024-06-01",
            "due": due,
            "est": est,
            "progress": progress
        }))
        .unwrap()
    }

    fn member(name: &str, hours: f64) -> TeamMember {
        TeamMember {
            id: name.to_lowercase(),
            name: name.to_string(),
            role: "Analyst".to_string(),
            hours,
            email: None,
        }
    }

    fn sample() -> Vec<Task> {
        let mut done = task("T-1", "Anna", "Done", "2024-06-05", 10.0, 100);
        done.completed_date = NaiveDate::from_ymd_opt(2024, 6, 5);
        vec![
            done,
            task("T-2", "Anna", "In Progress", "2024-06-10", 20.0, 50),
            task("T-3", "Anna", "Blocked", "2024-07-01", 10.0, 0),
            task("T-4", "Piotr", "To Do", "2024-06-13", 8.0, 0),
        ]
    }

    #[test]
    fn test_kpis() {
        let summary = compute_dashboard(&sample(), &[], &Settings::default(), today());
        let kpis = summary.kpis;
        assert_eq!(kpis.total, 4);
        assert_eq!(kpis.done, 1);
        assert_eq!(kpis.active, 3);
        assert_eq!(kpis.overdue, 1);
        assert_eq!(kpis.blocked, 1);
        assert_eq!(kpis.due_soon, 1);
        assert!((kpis.avg_progress - 50.0 / 3.0).abs() < 1e-9);
        assert!((kpis.remaining_hours - 28.0).abs() < 1e-9);
        assert_eq!(kpis.avg_completion_days, Some(4.0));
    }

    #[test]
    fn test_workload_bands() {
        let team = vec![member("Anna", 20.0), member("Piotr", 40.0), member("Idle", 0.0)];
        let summary = compute_dashboard(&sample(), &team, &Settings::default(), today());
        let anna = &summary.workload[0];
        // 10h + 10h remaining over 20h capacity
        assert!((anna.utilization - 100.0).abs() < 1e-9);
        assert_eq!(anna.band, RagBand::Orange);
        assert_eq!(anna.open_tasks, 2);
        assert_eq!(anna.overdue_tasks, 1);

        let piotr = &summary.workload[1];
        assert_eq!(piotr.band, RagBand::Green);
        assert_eq!(summary.workload[2].utilization, 0.0);
    }

    #[test]
    fn test_band_edges() {
        let t = RagThresholds::default();
        assert_eq!(RagBand::classify(70.0, &t), RagBand::Green);
        assert_eq!(RagBand::classify(70.1, &t), RagBand::Yellow);
        assert_eq!(RagBand::classify(95.0, &t), RagBand::Orange);
        assert_eq!(RagBand::classify(100.5, &t), RagBand::Red);
    }

    #[test]
    fn test_wip_usage() {
        let mut tasks = sample();
        for i in 0..4 {
            tasks.push(task(&format!("R-{i}"), "Anna", "In Review", "2024-08-01", 1.0, 0));
        }
        tasks.push(task("R-9", "Anna", "In Review", "2024-08-01", 1.0, 0));
        let wip = compute_wip(&tasks, &Settings::default());
        assert_eq!(wip.len(), 2);
        assert_eq!(wip[0].status, "In Progress");
        assert_eq!(wip[0].count, 1);
        assert!(!wip[0].exceeded);
        assert_eq!(wip[1].count, 5);
        assert!(wip[1].exceeded);
    }

    #[test]
    fn test_alert_level_counts() {
        let summary = compute_dashboard(&sample(), &[], &Settings::default(), today());
        assert_eq!(summary.alert_levels.get("overdue"), Some(&1));
        assert_eq!(summary.alert_levels.get("blocked"), Some(&1));
        assert_eq!(summary.alert_levels.get("deadline_soon"), Some(&1));
        assert_eq!(summary.alert_levels.get("ok"), None);
    }
}
