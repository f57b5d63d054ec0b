//! Stage graph builder
//!
//! Each call produces one [`Stage`] from the config and/or an earlier
//! stage's tasks, submitting every task to the execution engine before it
//! returns. Patterns:
//!
//! - **root**: one task per chromosome, no parents
//! - **per-sample root**: one task per sample, no parents
//! - **chain**: one child per parent, inputs read from the parent's outputs
//! - **fan-in**: parents grouped by a key, one child per group
//! - **summary**: a single child over every parent
//! - **cartesian**: root pattern repeated for each category combination
//!
//! Whenever earlier tasks drive construction they are first sorted by
//! creation id, and groups by natural order of their key, so rebuilding from
//! the same config yields the same `(stage, uid)` identities and edges.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{PipelineConfig, SampleBams};
use crate::engine::ExecutionEngine;
use crate::error::{Result, YapsError};
use crate::natural::NaturalKey;
use crate::region::Region;
use crate::resource::{resolve, ResourceContext, ResourceSpec};
use crate::stage::{Stage, StageName};
use crate::task::{sorted_by_id, Command, Params, Task, TaskHandle, TaskSpec, CHROM_PARAM};

// ============================================================================
// STAGE DEFINITION
// ============================================================================

/// Name, command and resource template shared by every task of a stage
#[derive(Debug, Clone)]
pub struct StageDef {
    pub name: StageName,
    pub command: Command,
    pub resources: ResourceSpec,
}

impl StageDef {
    /// Stage `"<index>-<label>"` whose command descriptor is its label
    pub fn new(name: &str, resources: ResourceSpec) -> Result<Self> {
        let name: StageName = name.parse()?;
        let command = Command::new(name.label());
        Ok(Self {
            name,
            command,
            resources,
        })
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Command::new(command);
        self
    }
}

/// Where one task of a stage writes: `<stage_dir>/<prefix..>/<key>`
///
/// The key is the chromosome, or the sample id in per-sample stages.
#[derive(Debug, Clone)]
pub struct TaskSlot {
    stage_dir: PathBuf,
    prefix: Vec<String>,
    key: String,
}

impl TaskSlot {
    fn new(stage_dir: &Path, prefix: Vec<String>, key: &str) -> Self {
        Self {
            stage_dir: stage_dir.to_path_buf(),
            prefix,
            key: key.to_string(),
        }
    }

    pub fn chrom(&self) -> &str {
        &self.key
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn stage_dir(&self) -> &Path {
        &self.stage_dir
    }

    pub fn dir(&self) -> PathBuf {
        let mut dir = self.stage_dir.clone();
        dir.extend(&self.prefix);
        dir.push(&self.key);
        dir
    }

    /// `file` inside [`TaskSlot::dir`], as a parameter value
    pub fn path(&self, file: &str) -> String {
        self.dir().join(file).display().to_string()
    }
}

/// One point of a cartesian expansion, e.g. `type=snps, method=tranche, label=1`
///
/// Keys become `in_<key>` parameters; values, in insertion order, prefix the
/// uid and the output directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Combination(Vec<(String, String)>);

impl Combination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn values(&self) -> Vec<String> {
        self.0.iter().map(|(_, v)| v.clone()).collect()
    }

    fn uid(&self, chrom: &str) -> String {
        let mut parts = self.values();
        parts.push(chrom.to_string());
        parts.join(":")
    }
}

/// Group tasks by `key`, groups in natural key order, members by creation id
pub fn group_tasks<K>(tasks: &[TaskHandle], key: K) -> Result<Vec<(String, Vec<TaskHandle>)>>
where
    K: Fn(&Task) -> Result<String>,
{
    let mut groups: BTreeMap<(NaturalKey, String), Vec<TaskHandle>> = BTreeMap::new();
    for task in sorted_by_id(tasks) {
        let k = key(&*task)?;
        groups
            .entry((NaturalKey::new(&k), k))
            .or_default()
            .push(task);
    }
    Ok(groups.into_iter().map(|((_, k), members)| (k, members)).collect())
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct StageGraphBuilder<'a, E: ExecutionEngine> {
    config: &'a PipelineConfig,
    engine: &'a mut E,
    context: ResourceContext,
}

impl<'a, E: ExecutionEngine> StageGraphBuilder<'a, E> {
    pub fn new(config: &'a PipelineConfig, engine: &'a mut E) -> Self {
        let context = config.resource_context();
        Self {
            config,
            engine,
            context,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        self.config
    }

    /// One task per configured chromosome, `uid = chrom`
    ///
    /// With a reference index configured, every chromosome token must parse
    /// as a [`Region`].
    pub fn root<F>(&mut self, def: &StageDef, mut make: F) -> Result<Stage>
    where
        F: FnMut(&TaskSlot, &Path) -> Result<Params>,
    {
        let config = self.config;
        let stage_dir = config.stage_dir(&def.name);
        let mut stage = Stage::new(def.name.clone(), Vec::new());

        for chrom in config.chroms() {
            self.check_region(chrom)?;
            let slot = TaskSlot::new(&stage_dir, Vec::new(), chrom);
            let params = make(&slot, config.input(chrom)?)?;
            let task = self.submit(def, chrom.clone(), Some(chrom.as_str()), params, Vec::new())?;
            stage.push(task);
        }

        self.finish(stage)
    }

    /// One task per sample, `uid = sample id`, no chromosome parameter
    pub fn per_sample<F>(&mut self, def: &StageDef, samples: &[(String, SampleBams)], mut make: F) -> Result<Stage>
    where
        F: FnMut(&TaskSlot, &SampleBams) -> Result<Params>,
    {
        if samples.is_empty() {
            return Err(YapsError::graph(format!("stage '{}' has no samples", def.name)));
        }

        let stage_dir = self.config.stage_dir(&def.name);
        let mut stage = Stage::new(def.name.clone(), Vec::new());

        for (id, sample) in samples {
            let slot = TaskSlot::new(&stage_dir, Vec::new(), id);
            let params = make(&slot, sample)?;
            let task = self.submit(def, id.clone(), None, params, Vec::new())?;
            stage.push(task);
        }

        self.finish(stage)
    }

    /// One child per parent, propagating uid and chromosome
    pub fn chain<F>(&mut self, def: &StageDef, parents: &[TaskHandle], make: F) -> Result<Stage>
    where
        F: FnMut(&TaskSlot, &Task) -> Result<Params>,
    {
        self.chain_filtered(def, parents, |_| true, make)
    }

    /// [`StageGraphBuilder::chain`] over the parents whose chromosome passes `keep`
    pub fn chain_filtered<P, F>(
        &mut self,
        def: &StageDef,
        parents: &[TaskHandle],
        keep: P,
        mut make: F,
    ) -> Result<Stage>
    where
        P: Fn(&str) -> bool,
        F: FnMut(&TaskSlot, &Task) -> Result<Params>,
    {
        let parents = self.check_chain_parents(def, parents)?;
        let stage_dir = self.config.stage_dir(&def.name);
        let mut stage = Stage::new(def.name.clone(), Vec::new());

        for parent in parents {
            let chrom = parent.chrom()?.to_string();
            if !keep(&chrom) {
                debug!(stage = %def.name, chrom = %chrom, "chromosome filtered out");
                continue;
            }
            let slot = TaskSlot::new(&stage_dir, Vec::new(), &chrom);
            let params = make(&slot, &*parent)?;
            let uid = parent.uid().to_string();
            let task = self.submit(def, uid, Some(chrom.as_str()), params, vec![parent])?;
            stage.push(task);
        }

        self.finish(stage)
    }

    /// One child per group of parents, `uid` and chromosome set to the group key
    pub fn fan_in<K, F>(
        &mut self,
        def: &StageDef,
        parents: &[TaskHandle],
        key: K,
        mut make: F,
    ) -> Result<Stage>
    where
        K: Fn(&Task) -> Result<String>,
        F: FnMut(&TaskSlot, &[TaskHandle]) -> Result<Params>,
    {
        if parents.is_empty() {
            return Err(YapsError::graph(format!("stage '{}' has no parents to fan in", def.name)));
        }

        let stage_dir = self.config.stage_dir(&def.name);
        let mut stage = Stage::new(def.name.clone(), Vec::new());

        for (group, members) in group_tasks(parents, key)? {
            debug!(stage = %def.name, group = %group, members = members.len(), "fan-in group");
            let slot = TaskSlot::new(&stage_dir, Vec::new(), &group);
            let params = make(&slot, members.as_slice())?;
            let task = self.submit(def, group.clone(), Some(group.as_str()), params, members)?;
            stage.push(task);
        }

        self.finish(stage)
    }

    /// Fan in by the contig of each parent's region
    ///
    /// `chr1:1-100` and `chr1:101-200` land in group `chr1`. Needs the
    /// reference index so names containing colons resolve verbatim.
    pub fn fan_in_by_contig<F>(&mut self, def: &StageDef, parents: &[TaskHandle], make: F) -> Result<Stage>
    where
        F: FnMut(&TaskSlot, &[TaskHandle]) -> Result<Params>,
    {
        let config = self.config;
        let index = config.reference_index().ok_or_else(|| {
            YapsError::config(format!(
                "stage '{}' groups by contig and needs 'reference_index'",
                def.name
            ))
        })?;

        self.fan_in(
            def,
            parents,
            |task| Ok(Region::parse_with(index, task.chrom()?)?.chrom().to_string()),
            make,
        )
    }

    /// A single task over every parent
    pub fn summarize<F>(&mut self, def: &StageDef, uid: &str, parents: &[TaskHandle], make: F) -> Result<Stage>
    where
        F: FnOnce(&Path, &[TaskHandle]) -> Result<Params>,
    {
        if parents.is_empty() {
            return Err(YapsError::graph(format!("stage '{}' has nothing to summarize", def.name)));
        }

        let parents = sorted_by_id(parents);
        let stage_dir = self.config.stage_dir(&def.name);
        let params = make(stage_dir.as_path(), parents.as_slice())?;
        let task = self.submit(def, uid.to_string(), None, params, parents)?;

        self.finish(Stage::new(def.name.clone(), vec![task]))
    }

    /// Root pattern for every combination, combinations outermost
    ///
    /// Emits `combinations × chromosomes` tasks with
    /// `uid = <value>:..:<chrom>` and an `in_<key>` parameter per key.
    pub fn cartesian<F>(&mut self, def: &StageDef, combinations: &[Combination], mut make: F) -> Result<Stage>
    where
        F: FnMut(&TaskSlot, &Combination, &Path) -> Result<Params>,
    {
        let config = self.config;
        let stage_dir = config.stage_dir(&def.name);
        let mut stage = Stage::new(def.name.clone(), Vec::new());

        for combo in combinations {
            for chrom in config.chroms() {
                self.check_region(chrom)?;
                let slot = TaskSlot::new(&stage_dir, combo.values(), chrom);
                let mut params = make(&slot, combo, config.input(chrom)?)?;
                for (key, value) in &combo.0 {
                    params.insert(format!("in_{}", key), value.clone());
                }
                let task = self.submit(def, combo.uid(chrom), Some(chrom.as_str()), params, Vec::new())?;
                stage.push(task);
            }
        }

        self.finish(stage)
    }

    // ─────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────

    fn check_region(&self, chrom: &str) -> Result<()> {
        if let Some(index) = self.config.reference_index() {
            Region::parse_with(index, chrom)?;
        }
        Ok(())
    }

    /// Parents sorted by id, all from one stage, a whole number of
    /// passes over the configured chromosomes
    fn check_chain_parents(&self, def: &StageDef, parents: &[TaskHandle]) -> Result<Vec<TaskHandle>> {
        let chroms = self.config.chroms().len();
        let Some(first) = parents.first() else {
            return Err(YapsError::graph(format!("stage '{}' has no parents to chain from", def.name)));
        };

        if let Some(other) = parents.iter().find(|p| p.stage() != first.stage()) {
            return Err(YapsError::graph(format!(
                "stage '{}' chains from mixed stages '{}' and '{}'",
                def.name,
                first.stage(),
                other.stage()
            )));
        }
        if chroms == 0 || parents.len() % chroms != 0 {
            return Err(YapsError::graph(format!(
                "stage '{}' got {} parents for {} chromosomes",
                def.name,
                parents.len(),
                chroms
            )));
        }
        for parent in parents {
            let chrom = parent.chrom()?;
            if !self.config.vcfs().contains_key(chrom) {
                return Err(YapsError::graph(format!(
                    "parent '{}' covers unconfigured chromosome '{}'",
                    parent.key(),
                    chrom
                )));
            }
        }

        Ok(sorted_by_id(parents))
    }

    fn submit(
        &mut self,
        def: &StageDef,
        uid: String,
        chrom: Option<&str>,
        mut params: Params,
        parents: Vec<TaskHandle>,
    ) -> Result<TaskHandle> {
        if let Some(chrom) = chrom {
            params.insert(CHROM_PARAM.to_string(), chrom.to_string());
        }
        self.engine.add_task(TaskSpec {
            stage: def.name.clone(),
            uid,
            params,
            command: def.command.clone(),
            resources: resolve(&def.resources, &self.context),
            parents,
        })
    }

    fn finish(&self, stage: Stage) -> Result<Stage> {
        info!(stage = %stage.name(), tasks = stage.len(), "built stage");
        Ok(stage)
    }
}

/// The parent's parameter as an owned value, for threading into a child
pub fn inherit(parent: &Task, name: &str) -> Result<String> {
    parent.param(name).map(str::to_string)
}

/// Clone a handle list, e.g. to pass one stage's tasks to two builders
pub fn handles(stage: &Stage) -> Vec<TaskHandle> {
    stage.tasks().iter().map(Arc::clone).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineKind, PipelineSettings};
    use crate::engine::PlanRecorder;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn config(dir: &TempDir, chroms: &[&str]) -> PipelineConfig {
        let table: String = chroms
            .iter()
            .map(|c| format!("{}\t/in/{}.vcf.gz\n", c, c))
            .collect();
        let input_vcfs = dir.path().join("vcfs.tsv");
        fs::write(&input_vcfs, table).unwrap();

        PipelineConfig::load(PipelineSettings {
            pipeline: PipelineKind::Postvqsr38,
            project_name: "test".to_string(),
            workspace: dir.path().join("ws"),
            job_db: None,
            email: None,
            input_vcfs: Some(input_vcfs),
            sample_bams: None,
            reference_index: None,
            tranches: None,
            percentiles: None,
            samples: None,
            plink_fam: None,
            vqslod_threshold: None,
            forbidden_chromosomes: None,
            docker: false,
            container: None,
            drm_job_group: None,
        })
        .unwrap()
    }

    fn def(name: &str) -> StageDef {
        StageDef::new(name, ResourceSpec::long_8g()).unwrap()
    }

    fn root_params(slot: &TaskSlot, input: &Path) -> Result<Params> {
        let mut params = Params::new();
        params.insert("in_vcf".into(), input.display().to_string());
        params.insert("out_vcf".into(), slot.path("out.vcf.gz"));
        Ok(params)
    }

    #[test]
    fn slot_paths_nest_prefix_then_chrom() {
        let slot = TaskSlot::new(Path::new("/ws/1-x"), vec!["snps".into(), "tranche".into()], "2");
        assert_eq!(slot.path("a.vcf.gz"), "/ws/1-x/snps/tranche/2/a.vcf.gz");
    }

    #[test]
    fn chain_rejects_mismatched_parent_count() {
        let dir = tempdir().unwrap();
        let config = config(&dir, &["1", "2", "3"]);
        let mut engine = PlanRecorder::new("test");
        let mut builder = StageGraphBuilder::new(&config, &mut engine);

        let root = builder.root(&def("1-root"), root_params).unwrap();
        let partial = &root.tasks()[..2];
        let err = builder
            .chain(&def("2-next"), partial, |_, _| Ok(Params::new()))
            .unwrap_err();
        assert!(matches!(err, YapsError::GraphConstruction { .. }));
    }

    #[test]
    fn chain_rejects_mixed_stages() {
        let dir = tempdir().unwrap();
        let config = config(&dir, &["1"]);
        let mut engine = PlanRecorder::new("test");
        let mut builder = StageGraphBuilder::new(&config, &mut engine);

        let a = builder.root(&def("1-a"), root_params).unwrap();
        let b = builder.root(&def("1-b"), root_params).unwrap();
        let mixed = vec![a.tasks()[0].clone(), b.tasks()[0].clone()];
        let err = builder
            .chain(&def("2-next"), &mixed, |_, _| Ok(Params::new()))
            .unwrap_err();
        assert!(err.to_string().contains("mixed stages"));
    }

    #[test]
    fn chain_filtered_skips_chromosomes() {
        let dir = tempdir().unwrap();
        let config = config(&dir, &["1", "2", "X"]);
        let mut engine = PlanRecorder::new("test");
        let mut builder = StageGraphBuilder::new(&config, &mut engine);

        let root = builder.root(&def("1-root"), root_params).unwrap();
        let autosomes = builder
            .chain_filtered(
                &def("2-autosomes"),
                root.tasks(),
                |chrom| chrom.starts_with(|c: char| c.is_ascii_digit()),
                |_, parent| {
                    let mut params = Params::new();
                    params.insert("in_vcf".into(), inherit(parent, "out_vcf")?);
                    Ok(params)
                },
            )
            .unwrap();
        let uids: Vec<&str> = autosomes.tasks().iter().map(|t| t.uid()).collect();
        assert_eq!(uids, vec!["1", "2"]);
    }

    #[test]
    fn missing_parent_output_is_reported() {
        let dir = tempdir().unwrap();
        let config = config(&dir, &["1"]);
        let mut engine = PlanRecorder::new("test");
        let mut builder = StageGraphBuilder::new(&config, &mut engine);

        let root = builder.root(&def("1-root"), root_params).unwrap();
        let err = builder
            .chain(&def("2-next"), root.tasks(), |_, parent| {
                let mut params = Params::new();
                params.insert("in_stats".into(), inherit(parent, "out_stats")?);
                Ok(params)
            })
            .unwrap_err();
        assert!(matches!(err, YapsError::MissingParam { .. }));
    }

    #[test]
    fn summarize_sorts_parents_by_id() {
        let dir = tempdir().unwrap();
        let config = config(&dir, &["1", "2", "10"]);
        let mut engine = PlanRecorder::new("test");
        let mut builder = StageGraphBuilder::new(&config, &mut engine);

        let root = builder.root(&def("1-root"), root_params).unwrap();
        let mut reversed = handles(&root);
        reversed.reverse();
        let summary = builder
            .summarize(&def("1.1-summary"), "all-chroms", &reversed, |dir, _| {
                let mut params = Params::new();
                params.insert("out_dir".into(), dir.display().to_string());
                Ok(params)
            })
            .unwrap();

        let task = summary.single().unwrap();
        let ids: Vec<usize> = task.parents().iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(task.chrom().is_err());
    }

    #[test]
    fn cartesian_expands_combinations_outermost() {
        let dir = tempdir().unwrap();
        let config = config(&dir, &["2", "1"]);
        let mut engine = PlanRecorder::new("test");
        let mut builder = StageGraphBuilder::new(&config, &mut engine);

        let combos = vec![
            Combination::new().with("type", "snps").with("label", "1"),
            Combination::new().with("type", "indels").with("label", "1"),
        ];
        let stage = builder
            .cartesian(&def("1-partition"), &combos, |slot, _, input| root_params(slot, input))
            .unwrap();

        let uids: Vec<&str> = stage.tasks().iter().map(|t| t.uid()).collect();
        assert_eq!(uids, vec!["snps:1:1", "snps:1:2", "indels:1:1", "indels:1:2"]);
        let last = &stage.tasks()[3];
        assert_eq!(last.param("in_type").unwrap(), "indels");
        assert_eq!(last.chrom().unwrap(), "2");
        assert!(last.param("out_vcf").unwrap().ends_with("1-partition/indels/1/2/out.vcf.gz"));
    }

    #[test]
    fn per_sample_root_keys_tasks_by_sample() {
        let dir = tempdir().unwrap();
        let config = config(&dir, &["1"]);
        let mut engine = PlanRecorder::new("test");
        let mut builder = StageGraphBuilder::new(&config, &mut engine);

        let sample = |bam: &str| SampleBams {
            bams: vec![PathBuf::from(bam)],
            meta: Default::default(),
        };
        let samples = vec![
            ("S2".to_string(), sample("/b/s2.bam")),
            ("S10".to_string(), sample("/b/s10.bam")),
        ];
        let stage = builder
            .per_sample(&def("1-realign"), &samples, |slot, sample| {
                let mut params = Params::new();
                params.insert("in_bams".into(), sample.joined());
                params.insert("out_prefix".into(), slot.path(&format!("{}.realign", slot.key())));
                Ok(params)
            })
            .unwrap();

        let uids: Vec<&str> = stage.tasks().iter().map(|t| t.uid()).collect();
        assert_eq!(uids, vec!["S2", "S10"]);
        let first = &stage.tasks()[0];
        assert!(first.chrom().is_err());
        assert!(first.parents().is_empty());
        assert!(first.param("out_prefix").unwrap().ends_with("1-realign/S2/S2.realign"));

        let err = builder.per_sample(&def("2-none"), &[], |_, _| Ok(Params::new())).unwrap_err();
        assert!(matches!(err, YapsError::GraphConstruction { .. }));
    }

    #[test]
    fn contig_fan_in_needs_reference_index() {
        let dir = tempdir().unwrap();
        let config = config(&dir, &["1"]);
        let mut engine = PlanRecorder::new("test");
        let mut builder = StageGraphBuilder::new(&config, &mut engine);

        let root = builder.root(&def("1-root"), root_params).unwrap();
        let err = builder
            .fan_in_by_contig(&def("2-concat"), root.tasks(), |_, _| Ok(Params::new()))
            .unwrap_err();
        assert!(err.to_string().contains("reference_index"));
    }
}
