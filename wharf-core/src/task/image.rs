//! Container image tasks
//!
//! Thin wrappers over the `docker` CLI. Image name, build context, and tag
//! fall back to the `docker_imagename` / `docker_codedir` / `docker_tag`
//! props, so earlier tasks (typically a callback deriving the name from
//! the webhook payload) can feed them in at run time.

use std::process::Command;

use serde_json::Value;

use crate::error::ExecutionError;
use crate::job::Job;
use crate::task::{TaskFlow, run_command};

fn resolve(
    explicit: &Option<String>,
    job: &Job,
    prop: &'static str,
) -> Result<String, ExecutionError> {
    explicit
        .clone()
        .or_else(|| job.prop_str(prop).map(String::from))
        .ok_or(ExecutionError::MissingProp(prop))
}

fn label(explicit: &Option<String>) -> String {
    explicit.clone().unwrap_or_else(|| "<from props>".into())
}

/// Builds an image from a context directory (default `code`)
pub struct ImageBuildTask {
    image: Option<String>,
    dir: Option<String>,
}

impl ImageBuildTask {
    pub fn new(image: Option<String>, dir: Option<String>) -> Self {
        Self { image, dir }
    }

    pub(crate) fn image_label(&self) -> String {
        label(&self.image)
    }

    pub(crate) fn run(&mut self, job: &mut Job) -> Result<TaskFlow, ExecutionError> {
        let image = resolve(&self.image, job, "docker_imagename")?;
        let dir = self
            .dir
            .clone()
            .or_else(|| job.prop_str("docker_codedir").map(String::from))
            .unwrap_or_else(|| "code".to_string());

        let mut command = Command::new("docker");
        command.args(["build", "-t", &image, &dir]);
        run_command(&format!("docker build {image}"), &mut command)?;
        Ok(TaskFlow::Continue)
    }
}

/// Retags an image; subsequent image tasks see the new name in props
pub struct ImageTagTask {
    image: Option<String>,
    tag: Option<String>,
}

impl ImageTagTask {
    pub fn new(image: Option<String>, tag: Option<String>) -> Self {
        Self { image, tag }
    }

    pub(crate) fn tag_label(&self) -> String {
        label(&self.tag)
    }

    pub(crate) fn run(&mut self, job: &mut Job) -> Result<TaskFlow, ExecutionError> {
        let image = resolve(&self.image, job, "docker_imagename")?;
        let tag = resolve(&self.tag, job, "docker_tag")?;

        let mut command = Command::new("docker");
        command.args(["tag", &image, &tag]);
        run_command(&format!("docker tag {image} {tag}"), &mut command)?;

        // Later build/push tasks operate on the tagged name
        job.props_mut()
            .insert("docker_imagename".into(), Value::String(tag));
        Ok(TaskFlow::Continue)
    }
}

/// Pushes an image to its registry
pub struct ImagePushTask {
    image: Option<String>,
}

impl ImagePushTask {
    pub fn new(image: Option<String>) -> Self {
        Self { image }
    }

    pub(crate) fn image_label(&self) -> String {
        label(&self.image)
    }

    pub(crate) fn run(&mut self, job: &mut Job) -> Result<TaskFlow, ExecutionError> {
        let image = resolve(&self.image, job, "docker_imagename")?;
        let mut command = Command::new("docker");
        command.args(["push", &image]);
        run_command(&format!("docker push {image}"), &mut command)?;
        Ok(TaskFlow::Continue)
    }
}
