//! 内存实现
//!
//! 面向测试与嵌入式单机模式的仓储/通道实现，行为与PostgreSQL
//! 实现保持一致。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use tokio::sync::RwLock;
use uuid::Uuid;

use base64::{engine::general_purpose, Engine as _};
use platform_core::{
    errors::{PlatformError, PlatformResult},
    models::{
        AppDomain, AppStatus, Application, BackupRecord, Build, BuildStatus, EnvironmentVariable,
        ManagedDatabase, NodeStatus, Plan, RegistrationToken, ResourceUsage, Runtime, SslStatus,
        TaskDescriptor, WorkerNode,
    },
    traits::{
        AgentChannel, ApplicationRepository, BuildRepository, DomainRepository, EnvVarRepository,
        ManagedDatabaseRepository, NodeRepository, RegistrationTokenRepository, SecretCipher,
    },
};

/// 内存节点仓储
#[derive(Default)]
pub struct MemoryNodeRepository {
    nodes: RwLock<HashMap<Uuid, WorkerNode>>,
    assigned_counts: RwLock<HashMap<Uuid, i64>>,
}

impl MemoryNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试辅助：设定节点上的应用计数
    pub async fn set_assigned_count(&self, node_id: Uuid, count: i64) {
        self.assigned_counts.write().await.insert(node_id, count);
    }
}

#[async_trait]
impl NodeRepository for MemoryNodeRepository {
    async fn create(&self, node: &WorkerNode) -> PlatformResult<WorkerNode> {
        self.nodes.write().await.insert(node.id, node.clone());
        Ok(node.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<WorkerNode>> {
        Ok(self.nodes.read().await.get(&id).cloned())
    }

    async fn list_all(&self) -> PlatformResult<Vec<WorkerNode>> {
        Ok(self.nodes.read().await.values().cloned().collect())
    }

    async fn list_by_region(&self, region: &str) -> PlatformResult<Vec<WorkerNode>> {
        let mut nodes: Vec<WorkerNode> = self
            .nodes
            .read()
            .await
            .values()
            .filter(|n| n.region == region)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn record_heartbeat(
        &self,
        node_id: Uuid,
        usage: &ResourceUsage,
        at: DateTime<Utc>,
    ) -> PlatformResult<bool> {
        let mut nodes = self.nodes.write().await;
        match nodes.get_mut(&node_id) {
            Some(node) => {
                node.cpu_used_millis = usage.cpu_used_millis;
                node.memory_used_mb = usage.memory_used_mb;
                node.disk_used_mb = usage.disk_used_mb;
                node.container_count = usage.container_count;
                node.last_heartbeat = Some(at);
                if node.status != NodeStatus::Disabled {
                    node.status = NodeStatus::Online;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status(&self, node_id: Uuid, status: NodeStatus) -> PlatformResult<()> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(&node_id)
            .ok_or(PlatformError::NodeNotFound { id: node_id })?;
        node.status = status;
        Ok(())
    }

    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> PlatformResult<u64> {
        let mut nodes = self.nodes.write().await;
        let mut affected = 0;
        for node in nodes.values_mut() {
            if node.status == NodeStatus::Online
                && node.last_heartbeat.map_or(true, |hb| hb < cutoff)
            {
                node.status = NodeStatus::Offline;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn count_assigned_applications(&self, node_id: Uuid) -> PlatformResult<i64> {
        Ok(*self.assigned_counts.read().await.get(&node_id).unwrap_or(&0))
    }

    async fn delete(&self, node_id: Uuid) -> PlatformResult<()> {
        self.nodes
            .write()
            .await
            .remove(&node_id)
            .ok_or(PlatformError::NodeNotFound { id: node_id })?;
        Ok(())
    }
}

/// 内存注册令牌仓储
#[derive(Default)]
pub struct MemoryTokenRepository {
    tokens: RwLock<HashMap<String, RegistrationToken>>,
}

impl MemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationTokenRepository for MemoryTokenRepository {
    async fn create(&self, token: &RegistrationToken) -> PlatformResult<()> {
        self.tokens
            .write()
            .await
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn consume(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> PlatformResult<Option<RegistrationToken>> {
        let mut tokens = self.tokens.write().await;
        match tokens.get(token) {
            Some(entry) if entry.expires_at > now => Ok(tokens.remove(token)),
            Some(_) => {
                // 过期令牌直接清掉
                tokens.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// 内存应用仓储，含运行时模板与资源套餐
#[derive(Default)]
pub struct MemoryApplicationRepository {
    apps: RwLock<HashMap<Uuid, Application>>,
    runtimes: RwLock<HashMap<Uuid, Runtime>>,
    plans: RwLock<HashMap<Uuid, Plan>>,
}

impl MemoryApplicationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_application(&self, app: Application) {
        self.apps.write().await.insert(app.id, app);
    }

    pub async fn insert_runtime(&self, runtime: Runtime) {
        self.runtimes.write().await.insert(runtime.id, runtime);
    }

    pub async fn insert_plan(&self, plan: Plan) {
        self.plans.write().await.insert(plan.id, plan);
    }
}

#[async_trait]
impl ApplicationRepository for MemoryApplicationRepository {
    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<Application>> {
        Ok(self.apps.read().await.get(&id).cloned())
    }

    async fn get_scoped(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> PlatformResult<Option<Application>> {
        Ok(self
            .apps
            .read()
            .await
            .get(&id)
            .filter(|a| a.organization_id == organization_id)
            .cloned())
    }

    async fn update_status(&self, id: Uuid, status: AppStatus) -> PlatformResult<()> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(&id)
            .ok_or(PlatformError::ApplicationNotFound { id })?;
        app.status = status;
        Ok(())
    }

    async fn assign_node(&self, id: Uuid, node_id: Uuid) -> PlatformResult<()> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(&id)
            .ok_or(PlatformError::ApplicationNotFound { id })?;
        app.node_id = Some(node_id);
        Ok(())
    }

    async fn set_current_build(&self, id: Uuid, build_id: Uuid) -> PlatformResult<()> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(&id)
            .ok_or(PlatformError::ApplicationNotFound { id })?;
        app.current_build_id = Some(build_id);
        Ok(())
    }

    async fn set_needs_redeploy(&self, id: Uuid, needs_redeploy: bool) -> PlatformResult<()> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(&id)
            .ok_or(PlatformError::ApplicationNotFound { id })?;
        app.needs_redeploy = needs_redeploy;
        Ok(())
    }

    async fn get_runtime(&self, id: Uuid) -> PlatformResult<Option<Runtime>> {
        Ok(self.runtimes.read().await.get(&id).cloned())
    }

    async fn get_plan(&self, id: Uuid) -> PlatformResult<Option<Plan>> {
        Ok(self.plans.read().await.get(&id).cloned())
    }
}

/// 内存构建仓储
#[derive(Default)]
pub struct MemoryBuildRepository {
    builds: RwLock<HashMap<Uuid, Build>>,
}

impl MemoryBuildRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.builds.read().await.len()
    }
}

#[async_trait]
impl BuildRepository for MemoryBuildRepository {
    async fn create(&self, build: &Build) -> PlatformResult<Build> {
        self.builds.write().await.insert(build.id, build.clone());
        Ok(build.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<Build>> {
        Ok(self.builds.read().await.get(&id).cloned())
    }

    async fn get_active_for_application(
        &self,
        application_id: Uuid,
    ) -> PlatformResult<Option<Build>> {
        Ok(self
            .builds
            .read()
            .await
            .values()
            .filter(|b| b.application_id == application_id && b.status.is_active())
            .max_by_key(|b| b.started_at)
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: BuildStatus,
        image_tag: Option<&str>,
        error_message: Option<&str>,
        finished_at: Option<DateTime<Utc>>,
    ) -> PlatformResult<()> {
        let mut builds = self.builds.write().await;
        let build = builds
            .get_mut(&id)
            .ok_or(PlatformError::BuildNotFound { id })?;
        build.status = status;
        if let Some(tag) = image_tag {
            build.image_tag = Some(tag.to_string());
        }
        if let Some(error) = error_message {
            build.error_message = Some(error.to_string());
        }
        if finished_at.is_some() {
            build.finished_at = finished_at;
        }
        Ok(())
    }

    async fn append_log(&self, id: Uuid, chunk: &str) -> PlatformResult<()> {
        let mut builds = self.builds.write().await;
        let build = builds
            .get_mut(&id)
            .ok_or(PlatformError::BuildNotFound { id })?;
        build.build_log.push_str(chunk);
        Ok(())
    }
}

/// 内存环境变量仓储
#[derive(Default)]
pub struct MemoryEnvVarRepository {
    vars: RwLock<HashMap<(Uuid, String), EnvironmentVariable>>,
}

impl MemoryEnvVarRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnvVarRepository for MemoryEnvVarRepository {
    async fn upsert(&self, var: &EnvironmentVariable) -> PlatformResult<()> {
        self.vars
            .write()
            .await
            .insert((var.application_id, var.key.clone()), var.clone());
        Ok(())
    }

    async fn list_for_application(
        &self,
        application_id: Uuid,
    ) -> PlatformResult<Vec<EnvironmentVariable>> {
        let mut vars: Vec<EnvironmentVariable> = self
            .vars
            .read()
            .await
            .values()
            .filter(|v| v.application_id == application_id)
            .cloned()
            .collect();
        vars.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(vars)
    }

    async fn delete(&self, application_id: Uuid, key: &str) -> PlatformResult<()> {
        self.vars
            .write()
            .await
            .remove(&(application_id, key.to_string()));
        Ok(())
    }
}

/// 内存域名仓储
#[derive(Default)]
pub struct MemoryDomainRepository {
    domains: RwLock<HashMap<Uuid, AppDomain>>,
}

impl MemoryDomainRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DomainRepository for MemoryDomainRepository {
    async fn create(&self, domain: &AppDomain) -> PlatformResult<()> {
        self.domains.write().await.insert(domain.id, domain.clone());
        Ok(())
    }

    async fn list_for_application(&self, application_id: Uuid) -> PlatformResult<Vec<AppDomain>> {
        let mut domains: Vec<AppDomain> = self
            .domains
            .read()
            .await
            .values()
            .filter(|d| d.application_id == application_id)
            .cloned()
            .collect();
        domains.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(domains)
    }

    async fn mark_verified(&self, id: Uuid) -> PlatformResult<()> {
        if let Some(domain) = self.domains.write().await.get_mut(&id) {
            domain.verification = platform_core::models::DomainVerification::Verified;
        }
        Ok(())
    }

    async fn update_ssl_status(&self, id: Uuid, status: SslStatus) -> PlatformResult<()> {
        if let Some(domain) = self.domains.write().await.get_mut(&id) {
            domain.ssl_status = status;
        }
        Ok(())
    }

    async fn mark_ssl_active_by_hostnames(
        &self,
        application_id: Uuid,
        hostnames: &[String],
    ) -> PlatformResult<u64> {
        let mut domains = self.domains.write().await;
        let mut affected = 0;
        for domain in domains.values_mut() {
            if domain.application_id == application_id
                && hostnames.contains(&domain.hostname)
                && domain.verification == platform_core::models::DomainVerification::Verified
            {
                domain.ssl_status = SslStatus::Active;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

/// 内存托管数据库仓储
#[derive(Default)]
pub struct MemoryManagedDatabaseRepository {
    databases: RwLock<HashMap<Uuid, ManagedDatabase>>,
    backups: RwLock<Vec<BackupRecord>>,
}

impl MemoryManagedDatabaseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_database(&self, database: ManagedDatabase) {
        self.databases.write().await.insert(database.id, database);
    }
}

#[async_trait]
impl ManagedDatabaseRepository for MemoryManagedDatabaseRepository {
    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<ManagedDatabase>> {
        Ok(self.databases.read().await.get(&id).cloned())
    }

    async fn record_backup(&self, record: &BackupRecord) -> PlatformResult<()> {
        self.backups.write().await.push(record.clone());
        Ok(())
    }

    async fn list_backups(&self, database_id: Uuid) -> PlatformResult<Vec<BackupRecord>> {
        Ok(self
            .backups
            .read()
            .await
            .iter()
            .filter(|b| b.database_id == database_id)
            .cloned()
            .collect())
    }
}

/// 记录型任务通道，测试中代替真实连接注册表
#[derive(Default)]
pub struct RecordingAgentChannel {
    online: RwLock<Vec<Uuid>>,
    sent: StdMutex<Vec<(Uuid, TaskDescriptor)>>,
    fail_next_send: StdMutex<bool>,
}

impl RecordingAgentChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_online(&self, node_id: Uuid) {
        self.online.write().await.push(node_id);
    }

    /// 下一次发送返回失败，模拟表面在线但写入失败的通道
    pub fn fail_next_send(&self) {
        *self.fail_next_send.lock().unwrap() = true;
    }

    pub fn sent_tasks(&self) -> Vec<(Uuid, TaskDescriptor)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentChannel for RecordingAgentChannel {
    async fn send_task(&self, node_id: Uuid, task: &TaskDescriptor) -> bool {
        if !self.online.read().await.contains(&node_id) {
            return false;
        }
        let mut fail = self.fail_next_send.lock().unwrap();
        if *fail {
            *fail = false;
            return false;
        }
        drop(fail);
        self.sent.lock().unwrap().push((node_id, task.clone()));
        true
    }

    async fn is_online(&self, node_id: Uuid) -> bool {
        self.online.read().await.contains(&node_id)
    }
}

/// 可逆的明文加密器，仅用于测试
pub struct PlainCipher;

impl SecretCipher for PlainCipher {
    fn encrypt(&self, plaintext: &str) -> PlatformResult<String> {
        Ok(format!(
            "plain:{}",
            general_purpose::STANDARD.encode(plaintext)
        ))
    }

    fn decrypt(&self, ciphertext: &str) -> PlatformResult<String> {
        let encoded = ciphertext
            .strip_prefix("plain:")
            .ok_or_else(|| PlatformError::Crypto("密文格式无效".to_string()))?;
        let bytes = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| PlatformError::Crypto(format!("密文不是合法的base64: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| PlatformError::Crypto(format!("解密结果不是合法的UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_consume_is_single_use() {
        let repo = MemoryTokenRepository::new();
        let token = RegistrationToken {
            token: "tok-1".to_string(),
            region: "us-east".to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(24),
        };
        repo.create(&token).await.unwrap();

        assert!(repo.consume("tok-1", Utc::now()).await.unwrap().is_some());
        assert!(repo.consume("tok-1", Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let repo = MemoryTokenRepository::new();
        let token = RegistrationToken {
            token: "tok-2".to_string(),
            region: "us-east".to_string(),
            created_at: Utc::now() - chrono::Duration::hours(48),
            expires_at: Utc::now() - chrono::Duration::hours(24),
        };
        repo.create(&token).await.unwrap();

        assert!(repo.consume("tok-2", Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scoped_lookup_enforces_tenant_isolation() {
        let repo = MemoryApplicationRepository::new();
        let org = Uuid::new_v4();
        let app = Application {
            id: Uuid::new_v4(),
            organization_id: org,
            name: "web".to_string(),
            region: "us-east".to_string(),
            node_id: None,
            runtime_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            current_build_id: None,
            status: AppStatus::Pending,
            instances: 1,
            needs_redeploy: false,
            git_url: "https://git.example.com/web.git".to_string(),
            git_branch: "main".to_string(),
            git_commit: None,
            build_command: None,
            start_command: None,
            created_at: Utc::now(),
        };
        let id = app.id;
        repo.insert_application(app).await;

        assert!(repo.get_scoped(id, org).await.unwrap().is_some());
        assert!(repo.get_scoped(id, Uuid::new_v4()).await.unwrap().is_none());
    }
}
