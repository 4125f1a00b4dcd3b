//! 角色继承解析器
//!
//! 深度优先遍历继承图：`path` 记录当前路径用于环检测，`done` 让菱形继承只展开一次。
//! 合并时先取并集再由 deny 覆盖 allow，结果与遍历顺序无关

use std::collections::BTreeSet;

use jit_errors::{AppError, AppResult, ResolutionError};

use super::effective::EffectivePolicy;
use crate::domain::role::{Identity, ResolvedPatterns, Role, RoleGraph, RoleId};

pub struct Resolver<'a> {
    graph: &'a RoleGraph,
}

impl<'a> Resolver<'a> {
    pub fn new(graph: &'a RoleGraph) -> Self {
        Self { graph }
    }

    /// 解析角色对某主体的有效策略
    pub fn resolve(&self, role_id: &RoleId, identity: &Identity) -> AppResult<EffectivePolicy> {
        let order = self.linearize(role_id)?;
        let requested = order
            .last()
            .copied()
            .ok_or_else(|| ResolutionError::UnknownRole(role_id.to_string()))?;

        let permissions = ResolvedPatterns::merge(order.iter().map(|r| &r.permissions));
        let resources = ResolvedPatterns::merge(order.iter().map(|r| &r.resources));

        if !requested.scopes.admits(identity) {
            return Err(ResolutionError::ScopeMismatch {
                role: role_id.to_string(),
                subject: identity.subject(),
            }
            .into());
        }

        let mut seen = BTreeSet::new();
        let mut workflows = Vec::new();
        for role in &order {
            for workflow_id in &role.workflows {
                if !seen.insert(workflow_id) {
                    continue;
                }
                let workflow = self.graph.workflow(workflow_id).ok_or_else(|| {
                    AppError::configuration(format!(
                        "role {} references unknown workflow {}",
                        role.id, workflow_id
                    ))
                })?;
                workflows.push(workflow.clone());
            }
        }

        let mut providers: Vec<String> = Vec::new();
        for role in &order {
            for provider in &role.providers {
                if !providers.contains(provider) {
                    providers.push(provider.clone());
                }
            }
        }

        // 离请求角色最近的定义生效
        let max_duration_secs = order.iter().rev().find_map(|r| r.max_duration_secs);

        Ok(EffectivePolicy {
            role_id: role_id.clone(),
            subject: identity.subject(),
            permissions,
            resources,
            workflows,
            providers,
            max_duration_secs,
            graph_version: self.graph.version(),
        })
    }

    /// 后序遍历: 祖先在前，请求角色在最后
    fn linearize(&self, root: &RoleId) -> Result<Vec<&'a Role>, ResolutionError> {
        let mut order = Vec::new();
        let mut path = Vec::new();
        let mut done = BTreeSet::new();
        self.visit(root, &mut path, &mut done, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        id: &RoleId,
        path: &mut Vec<RoleId>,
        done: &mut BTreeSet<RoleId>,
        order: &mut Vec<&'a Role>,
    ) -> Result<(), ResolutionError> {
        if let Some(start) = path.iter().position(|p| p == id) {
            let mut cycle: Vec<String> = path[start..].iter().map(ToString::to_string).collect();
            cycle.push(id.to_string());
            return Err(ResolutionError::CyclicInheritance {
                role: id.to_string(),
                path: cycle,
            });
        }
        if done.contains(id) {
            return Ok(());
        }

        let role = self
            .graph
            .role(id)
            .ok_or_else(|| ResolutionError::UnknownRole(id.to_string()))?;

        path.push(id.clone());
        for parent in &role.inherits {
            self.visit(parent, path, done, order)?;
        }
        path.pop();

        done.insert(id.clone());
        order.push(role);
        Ok(())
    }
}
