//! `goal_management` tool: a single tool name dispatching on `operation`
//! to the `GoalPort` — create_goal, list_goals, plan_tasks,
//! update_task_status, complete_goal, write_diary.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::ports::{GoalPort, NewTask, TaskStatus};
use crate::{ContextHandle, Milestone, SecurityLevel, Tool, ToolMetadata, ToolOutput, ToolParam, ToolSpec};

fn get_str<'a>(args: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn parse_status(s: &str) -> Option<TaskStatus> {
    match s.to_lowercase().as_str() {
        "pending" => Some(TaskStatus::Pending),
        "in_progress" => Some(TaskStatus::InProgress),
        "completed" => Some(TaskStatus::Completed),
        "failed" => Some(TaskStatus::Failed),
        _ => None,
    }
}

fn parse_tasks(raw: &Value) -> Option<Vec<NewTask>> {
    let arr = raw.as_array()?;
    if arr.is_empty() {
        return None;
    }
    arr.iter()
        .map(|t| {
            let title = t.get("title")?.as_str()?.to_string();
            let description = t.get("description").and_then(Value::as_str).map(str::to_string);
            Some(NewTask { title, description })
        })
        .collect()
}

pub struct GoalManagementTool {
    pub port: Arc<dyn GoalPort>,
}

#[async_trait]
impl Tool for GoalManagementTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "goal_management".to_string(),
            description: "Manage autonomous goals: create_goal, list_goals, plan_tasks, \
                update_task_status, complete_goal, write_diary."
                .to_string(),
            params: vec![
                ToolParam {
                    name: "operation".to_string(),
                    description: "create_goal | list_goals | plan_tasks | update_task_status \
                        | complete_goal | write_diary"
                        .to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "goal_id".to_string(),
                    description: "Target goal id".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "title".to_string(),
                    description: "Goal title (create_goal)".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "tasks".to_string(),
                    description: "Array of {title, description?} (plan_tasks)".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "task_id".to_string(),
                    description: "Target task id (update_task_status)".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "status".to_string(),
                    description: "pending | in_progress | completed | failed".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "text".to_string(),
                    description: "Diary entry text (write_diary)".to_string(),
                    required: false,
                    ..Default::default()
                },
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "goals".to_string(),
            },
        }
    }

    async fn run(&self, ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let Some(operation) = get_str(args, "operation") else {
            return Ok(ToolOutput::fail("missing required param: operation"));
        };

        match operation {
            "create_goal" => {
                let Some(title) = get_str(args, "title") else {
                    return Ok(ToolOutput::fail("create_goal requires 'title'"));
                };
                match self.port.create_goal(title.to_string()).await {
                    Ok(goal) => Ok(ToolOutput::ok(format!("created goal {} ({})", goal.id, goal.title))),
                    Err(e) => Ok(ToolOutput::fail(e.to_string())),
                }
            }
            "list_goals" => match self.port.list_goals().await {
                Ok(goals) => {
                    let summary = goals
                        .iter()
                        .map(|g| format!("{} — {} ({} tasks)", g.id, g.title, g.tasks.len()))
                        .collect::<Vec<_>>()
                        .join("\n");
                    Ok(ToolOutput::ok(if summary.is_empty() {
                        "no goals".to_string()
                    } else {
                        summary
                    }))
                }
                Err(e) => Ok(ToolOutput::fail(e.to_string())),
            },
            "plan_tasks" => {
                let Some(goal_id) = get_str(args, "goal_id") else {
                    return Ok(ToolOutput::fail("plan_tasks requires 'goal_id'"));
                };
                let Some(tasks) = args.get("tasks").and_then(parse_tasks) else {
                    return Ok(ToolOutput::fail(
                        "plan_tasks requires a non-empty array of {title, description?}",
                    ));
                };
                match self.port.plan_tasks(goal_id, tasks).await {
                    Ok(goal) => Ok(ToolOutput::ok(format!(
                        "goal {} now has {} task(s)",
                        goal.id,
                        goal.tasks.len()
                    ))),
                    Err(e) => Ok(ToolOutput::fail(format!("UPSTREAM_ERROR: {e}"))),
                }
            }
            "update_task_status" => {
                let (Some(goal_id), Some(task_id), Some(status_raw)) =
                    (get_str(args, "goal_id"), get_str(args, "task_id"), get_str(args, "status"))
                else {
                    return Ok(ToolOutput::fail(
                        "update_task_status requires 'goal_id', 'task_id', and 'status'",
                    ));
                };
                let Some(status) = parse_status(status_raw) else {
                    return Ok(ToolOutput::fail(format!("invalid status '{status_raw}'")));
                };
                match self.port.update_task_status(goal_id, task_id, status).await {
                    Ok(goal) => {
                        if status == TaskStatus::Completed {
                            ctx.record_milestone(Milestone {
                                goal_id: goal.id.clone(),
                                task_id: Some(task_id.to_string()),
                                kind: "task_completed".to_string(),
                                detail: task_id.to_string(),
                            });
                        }
                        Ok(ToolOutput::ok(format!("task {task_id} set to {status_raw}")))
                    }
                    Err(e) => Ok(ToolOutput::fail(e.to_string())),
                }
            }
            "complete_goal" => {
                let Some(goal_id) = get_str(args, "goal_id") else {
                    return Ok(ToolOutput::fail("complete_goal requires 'goal_id'"));
                };
                match self.port.complete_goal(goal_id).await {
                    Ok(goal) => {
                        ctx.record_milestone(Milestone {
                            goal_id: goal.id.clone(),
                            task_id: None,
                            kind: "goal_completed".to_string(),
                            detail: goal.title.clone(),
                        });
                        Ok(ToolOutput::ok(format!("goal {goal_id} completed")))
                    }
                    Err(e) => Ok(ToolOutput::fail(e.to_string())),
                }
            }
            "write_diary" => {
                let (Some(goal_id), Some(text)) = (get_str(args, "goal_id"), get_str(args, "text"))
                else {
                    return Ok(ToolOutput::fail("write_diary requires 'goal_id' and 'text'"));
                };
                match self.port.write_diary(goal_id, text.to_string()).await {
                    Ok(()) => Ok(ToolOutput::ok("diary entry recorded")),
                    Err(e) => Ok(ToolOutput::fail(e.to_string())),
                }
            }
            other => Ok(ToolOutput::fail(format!("unknown goal_management operation '{other}'"))),
        }
    }
}
