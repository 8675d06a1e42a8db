//! 构建与部署流水线
//!
//! 部署任务的节点侧执行：浅克隆仓库，按运行时模板生成Dockerfile，
//! 构建镜像并以套餐限额启动容器。镜像标签由任务ID推导，重复投递
//! 的同一任务产出同一标签。工作目录无论成败都会清理。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use platform_core::errors::{PlatformError, PlatformResult};
use platform_core::models::{ControlAction, DeployTask};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 外部命令的执行结果
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// 外部命令执行接口，测试中以记录型实现替换
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> PlatformResult<CommandOutput>;
}

/// 基于tokio子进程的命令执行
#[derive(Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> PlatformResult<CommandOutput> {
        let mut command = Command::new(program);
        command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        debug!("执行命令: {} {}", program, args.join(" "));
        let output = command
            .output()
            .await
            .map_err(|e| PlatformError::Internal(format!("命令 {program} 启动失败: {e}")))?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// 日志块接收端，流水线边执行边回推
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn chunk(&self, chunk: &str);
}

/// 由任务ID推导镜像标签
///
/// 同一任务的重复投递得到同一标签，构建因此幂等。
pub fn image_tag_for(application_id: Uuid, task_id: &str) -> String {
    let suffix: String = task_id.chars().filter(|c| c.is_ascii_alphanumeric()).take(12).collect();
    format!("platform-app-{application_id}:{suffix}")
}

fn container_name(application_id: Uuid) -> String {
    format!("platform-app-{application_id}")
}

pub struct BuildPipeline {
    runner: Arc<dyn CommandRunner>,
    workspace_root: PathBuf,
}

impl BuildPipeline {
    pub fn new(runner: Arc<dyn CommandRunner>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workspace_root: workspace_root.into(),
        }
    }

    /// 执行一次完整部署，返回镜像标签
    ///
    /// 工作目录在成功与失败路径上都被清理。
    pub async fn execute(
        &self,
        task_id: &str,
        application_id: Uuid,
        task: &DeployTask,
        logs: &dyn LogSink,
    ) -> PlatformResult<String> {
        let workspace = self.workspace_root.join(task_id);
        let result = self.execute_in(&workspace, task_id, application_id, task, logs).await;

        if let Err(e) = tokio::fs::remove_dir_all(&workspace).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("清理工作目录 {:?} 失败: {}", workspace, e);
            }
        }
        result
    }

    async fn execute_in(
        &self,
        workspace: &Path,
        task_id: &str,
        application_id: Uuid,
        task: &DeployTask,
        logs: &dyn LogSink,
    ) -> PlatformResult<String> {
        tokio::fs::create_dir_all(workspace)
            .await
            .map_err(|e| PlatformError::Internal(format!("创建工作目录失败: {e}")))?;
        let source_dir = workspace.join("src");

        logs.chunk(&format!("克隆 {} ({})\n", task.git_url, task.git_branch)).await;
        self.checkout_source(task, &source_dir).await?;

        self.write_dockerfile(task, &source_dir).await?;

        let tag = image_tag_for(application_id, task_id);
        logs.chunk(&format!("构建镜像 {tag}\n")).await;
        let build = self
            .runner
            .run(
                "docker",
                &[
                    "build".to_string(),
                    "-t".to_string(),
                    tag.clone(),
                    source_dir.to_string_lossy().into_owned(),
                ],
                None,
            )
            .await?;
        logs.chunk(&build.stdout).await;
        if !build.success {
            logs.chunk(&build.stderr).await;
            return Err(PlatformError::Internal(format!(
                "镜像构建失败: {}",
                build.stderr.lines().last().unwrap_or("unknown")
            )));
        }

        logs.chunk("启动容器\n").await;
        self.restart_container(application_id, task, &tag).await?;

        info!("部署完成: 应用 {} 镜像 {}", application_id, tag);
        Ok(tag)
    }

    async fn checkout_source(&self, task: &DeployTask, source_dir: &Path) -> PlatformResult<()> {
        let clone = self
            .runner
            .run(
                "git",
                &[
                    "clone".to_string(),
                    "--depth".to_string(),
                    "1".to_string(),
                    "--branch".to_string(),
                    task.git_branch.clone(),
                    task.git_url.clone(),
                    source_dir.to_string_lossy().into_owned(),
                ],
                None,
            )
            .await?;
        if !clone.success {
            return Err(PlatformError::Internal(format!(
                "git clone失败: {}",
                clone.stderr.lines().last().unwrap_or("unknown")
            )));
        }

        // 固定提交：浅克隆后按需补取该提交再检出
        if let Some(commit) = &task.git_commit {
            let fetch = self
                .runner
                .run(
                    "git",
                    &[
                        "fetch".to_string(),
                        "--depth".to_string(),
                        "1".to_string(),
                        "origin".to_string(),
                        commit.clone(),
                    ],
                    Some(source_dir),
                )
                .await?;
            if !fetch.success {
                return Err(PlatformError::Internal(format!("git fetch {commit} 失败")));
            }
            let checkout = self
                .runner
                .run(
                    "git",
                    &["checkout".to_string(), commit.clone()],
                    Some(source_dir),
                )
                .await?;
            if !checkout.success {
                return Err(PlatformError::Internal(format!("git checkout {commit} 失败")));
            }
        }
        Ok(())
    }

    async fn write_dockerfile(&self, task: &DeployTask, source_dir: &Path) -> PlatformResult<()> {
        let mut dockerfile = format!(
            "FROM {}\nWORKDIR /app\nCOPY . .\nRUN {}\n",
            task.base_image, task.build_command
        );
        if !task.run_as_root {
            dockerfile.push_str("RUN adduser --disabled-password --gecos '' app || useradd -m app\nUSER app\n");
        }
        dockerfile.push_str(&format!("EXPOSE {}\nCMD {}\n", task.port, task.start_command));

        tokio::fs::write(source_dir.join("Dockerfile"), dockerfile)
            .await
            .map_err(|e| PlatformError::Internal(format!("写入Dockerfile失败: {e}")))
    }

    async fn restart_container(
        &self,
        application_id: Uuid,
        task: &DeployTask,
        tag: &str,
    ) -> PlatformResult<()> {
        let name = container_name(application_id);

        // 旧容器可能不存在，失败可忽略
        let _ = self
            .runner
            .run("docker", &["rm".to_string(), "-f".to_string(), name.clone()], None)
            .await;

        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name,
            "--restart".to_string(),
            "unless-stopped".to_string(),
            "-p".to_string(),
            format!("{}", task.port),
            "--memory".to_string(),
            format!("{}m", task.memory_mb),
            "--cpus".to_string(),
            format!("{:.3}", task.cpu_millis as f64 / 1000.0),
        ];
        for (key, value) in &task.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(tag.to_string());

        let run = self.runner.run("docker", &args, None).await?;
        if !run.success {
            return Err(PlatformError::Internal(format!(
                "容器启动失败: {}",
                run.stderr.lines().last().unwrap_or("unknown")
            )));
        }
        Ok(())
    }

    /// 执行控制动作
    pub async fn apply_control(
        &self,
        application_id: Uuid,
        action: ControlAction,
        instances: Option<i32>,
    ) -> PlatformResult<()> {
        let name = container_name(application_id);
        let subcommand = match action {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
            ControlAction::Restart => "restart",
            ControlAction::Scale => {
                // 单容器运行模型下扩缩容需要重新部署生效
                warn!(
                    "应用 {} 请求扩缩容到 {:?} 实例，当前以单容器运行，待下次部署生效",
                    application_id, instances
                );
                return Ok(());
            }
        };

        let output = self
            .runner
            .run("docker", &[subcommand.to_string(), name.clone()], None)
            .await?;
        if !output.success {
            return Err(PlatformError::Internal(format!(
                "容器 {name} {subcommand} 失败: {}",
                output.stderr.lines().last().unwrap_or("unknown")
            )));
        }
        info!("应用 {} 控制动作 {} 已执行", application_id, action);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct RecordingRunner {
        calls: Mutex<Vec<(String, Vec<String>)>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingRunner {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on,
            }
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            _cwd: Option<&Path>,
        ) -> PlatformResult<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            let fail = self
                .fail_on
                .is_some_and(|sub| args.first().map(String::as_str) == Some(sub));
            Ok(CommandOutput {
                success: !fail,
                stdout: String::new(),
                stderr: if fail { "boom".to_string() } else { String::new() },
            })
        }
    }

    struct NullSink;

    #[async_trait]
    impl LogSink for NullSink {
        async fn chunk(&self, _chunk: &str) {}
    }

    fn deploy_task() -> DeployTask {
        DeployTask {
            build_id: Uuid::new_v4(),
            git_url: "https://git.example.com/app.git".to_string(),
            git_branch: "main".to_string(),
            git_commit: None,
            base_image: "node:20-slim".to_string(),
            build_command: "npm ci".to_string(),
            start_command: "npm start".to_string(),
            port: 3000,
            cpu_millis: 500,
            memory_mb: 256,
            disk_mb: 1024,
            instances: 1,
            env: BTreeMap::from([("PORT".to_string(), "3000".to_string())]),
            domains: vec![],
            run_as_root: false,
        }
    }

    #[test]
    fn image_tag_is_deterministic_per_task() {
        let app = Uuid::new_v4();
        let build_id = Uuid::new_v4().to_string();
        assert_eq!(image_tag_for(app, &build_id), image_tag_for(app, &build_id));
        assert_ne!(
            image_tag_for(app, &build_id),
            image_tag_for(app, &Uuid::new_v4().to_string())
        );
    }

    #[tokio::test]
    async fn successful_deploy_cleans_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new(None));
        let pipeline = BuildPipeline::new(runner.clone(), dir.path());

        let task = deploy_task();
        let app = Uuid::new_v4();
        let tag = pipeline
            .execute("task-1", app, &task, &NullSink)
            .await
            .unwrap();
        assert_eq!(tag, image_tag_for(app, "task-1"));

        assert!(!dir.path().join("task-1").exists());
        let programs: Vec<String> = runner.calls().into_iter().map(|(p, _)| p).collect();
        assert!(programs.contains(&"git".to_string()));
        assert!(programs.contains(&"docker".to_string()));
    }

    #[tokio::test]
    async fn failed_build_still_cleans_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new(Some("build")));
        let pipeline = BuildPipeline::new(runner, dir.path());

        let result = pipeline
            .execute("task-2", Uuid::new_v4(), &deploy_task(), &NullSink)
            .await;
        assert!(result.is_err());
        assert!(!dir.path().join("task-2").exists());
    }

    #[tokio::test]
    async fn env_vars_are_passed_to_container() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new(None));
        let pipeline = BuildPipeline::new(runner.clone(), dir.path());

        pipeline
            .execute("task-3", Uuid::new_v4(), &deploy_task(), &NullSink)
            .await
            .unwrap();

        let run_call = runner
            .calls()
            .into_iter()
            .find(|(p, args)| p == "docker" && args.first().map(String::as_str) == Some("run"))
            .unwrap();
        assert!(run_call.1.contains(&"PORT=3000".to_string()));
    }

    #[tokio::test]
    async fn scale_is_deferred_to_next_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new(None));
        let pipeline = BuildPipeline::new(runner.clone(), dir.path());

        pipeline
            .apply_control(Uuid::new_v4(), ControlAction::Scale, Some(3))
            .await
            .unwrap();
        assert!(runner.calls().is_empty());

        pipeline
            .apply_control(Uuid::new_v4(), ControlAction::Stop, None)
            .await
            .unwrap();
        assert_eq!(runner.calls().len(), 1);
    }
}
