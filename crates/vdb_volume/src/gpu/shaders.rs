/// Structs and helpers prepended to every kernel module.
pub const COMMON_WGSL: &str = r#"
struct Frame {
  inverse_projection: mat4x4<f32>,
  camera_to_world: mat4x4<f32>,
  bounds_min: vec3<f32>,
  frame: u32,
  sun_direction: vec3<f32>,
  light_count: u32,
  fog_color: vec3<f32>,
  fog_adjustment: f32,
  background_color: vec3<f32>,
  reset_history: u32,
  volume_dims: vec3<u32>,
  has_sdf: u32,
  screen_size: vec2<u32>,
  sdf_resolution: u32,
  sdf_count: u32,
  shadow_distance_offset: u32,
  indirect_lighting: u32,
  _pad0: vec2<u32>,
};

struct Scatter {
  extent: vec3<u32>,
  entry_count: u32,
  copy1: u32,
  _pad0: u32,
  _pad1: u32,
  _pad2: u32,
};

struct MeshParams {
  position: vec3<f32>,
  triangle_count: u32,
  scale: vec3<f32>,
  sdf_resolution: u32,
};

struct SdfParams {
  resolution: u32,
  mode: u32,
  site_count: u32,
  _pad0: u32,
};

struct Light {
  position: vec3<f32>,
  kind: u32,
  direction: vec3<f32>,
  _pad0: u32,
  color: vec3<f32>,
  _pad1: u32,
};

struct SdfCell {
  radiance: vec3<f32>,
  samples: f32,
  normal: vec3<f32>,
  _pad0: f32,
};

const LINEAR_WORKGROUP: u32 = 64u;
const LIGHT_DIRECTIONAL: u32 = 1u;
const SDF_MODE_REINIT: u32 = 1u;
const MAX_HISTORY: f32 = 64.0;

// 1D dispatches spill into y once x reaches the per-dimension limit.
fn linear_index(gid: vec3<u32>, groups: vec3<u32>) -> u32 {
  return gid.x + gid.y * groups.x * LINEAR_WORKGROUP;
}

fn volume_index(cell: vec3<u32>, dims: vec3<u32>) -> u32 {
  return cell.x + dims.x * (cell.y + dims.y * cell.z);
}

fn in_dims(p: vec3<f32>, dims: vec3<u32>) -> bool {
  return all(p >= vec3<f32>(0.0)) && all(p < vec3<f32>(dims));
}

fn sdf_cell_index(cell: vec3<u32>, res: u32) -> u32 {
  return cell.x + res * (cell.y + res * cell.z);
}

// xyz: unit direction towards the light, w: distance.
fn light_ray(light: Light, p: vec3<f32>) -> vec4<f32> {
  if (light.kind == LIGHT_DIRECTIONAL) {
    return vec4<f32>(-normalize(light.direction), 1.0e4);
  }
  let to_light = light.position - p;
  let dist = length(to_light);
  return vec4<f32>(to_light / max(dist, 1.0e-4), dist);
}

fn light_falloff(light: Light, dist: f32) -> f32 {
  if (light.kind == LIGHT_DIRECTIONAL) {
    return 1.0;
  }
  return 1.0 / max(dist * dist, 1.0);
}

fn accumulate(previous: vec4<f32>, value: vec3<f32>, reset: bool) -> vec4<f32> {
  if (reset || previous.w <= 0.0) {
    return vec4<f32>(value, 1.0);
  }
  let n = min(previous.w + 1.0, MAX_HISTORY);
  return vec4<f32>(mix(previous.xyz, value, 1.0 / n), n);
}
"#;

/// Kernel 0: marches the volume and the SDF per pixel.
pub const SHADE_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> globals: Frame;
@group(0) @binding(1) var<uniform> params: Scatter;
@group(0) @binding(2) var<storage, read> volume: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read> shadow: array<vec2<f32>>;
@group(0) @binding(4) var<storage, read> lights: array<Light>;
@group(0) @binding(5) var<storage, read> sdf_index: array<u32>;
@group(0) @binding(6) var<storage, read> sdf_cells: array<SdfCell>;
@group(0) @binding(7) var output: texture_storage_2d<rgba32float, write>;

const MAX_STEPS: u32 = 512u;

fn sdf_slot(world: vec3<f32>) -> u32 {
  if (globals.has_sdf == 0u) {
    return 0u;
  }
  let local = world - globals.bounds_min;
  let res = globals.sdf_resolution;
  if (any(local < vec3<f32>(0.0)) || any(local >= vec3<f32>(f32(res)))) {
    return 0u;
  }
  return sdf_index[sdf_cell_index(vec3<u32>(local), res)];
}

fn sun_color() -> vec3<f32> {
  var color = vec3<f32>(0.0);
  for (var l = 0u; l < globals.light_count; l = l + 1u) {
    if (lights[l].kind == LIGHT_DIRECTIONAL) {
      color = lights[l].color;
    }
  }
  return color;
}

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
  if (gid.x >= globals.screen_size.x || gid.y >= globals.screen_size.y) {
    return;
  }
  let uv = (vec2<f32>(gid.xy) + vec2<f32>(0.5)) / vec2<f32>(globals.screen_size) * 2.0 - vec2<f32>(1.0);
  let origin = (globals.camera_to_world * vec4<f32>(0.0, 0.0, 0.0, 1.0)).xyz;
  let view = globals.inverse_projection * vec4<f32>(uv.x, -uv.y, 0.0, 1.0);
  let dir = normalize((globals.camera_to_world * vec4<f32>(view.xyz, 0.0)).xyz);
  let dims = min(params.extent, globals.volume_dims);
  let sun = sun_color();

  var color = vec3<f32>(0.0);
  var transmit = 1.0;
  for (var s = 0u; s < MAX_STEPS; s = s + 1u) {
    if (transmit < 0.01) {
      break;
    }
    let p = origin + dir * (f32(s) + 0.5);
    let slot = sdf_slot(p);
    if (slot != 0u) {
      color = color + transmit * sdf_cells[slot - 1u].radiance;
      transmit = 0.0;
      break;
    }
    if (!in_dims(p, dims)) {
      continue;
    }
    let index = volume_index(vec3<u32>(p), globals.volume_dims);
    let v = volume[index];
    let density = (v.x + v.y) * globals.fog_adjustment;
    if (density <= 0.0) {
      continue;
    }
    let lit = shadow[index];
    let absorb = 1.0 - exp(-density);
    color = color + transmit * absorb * (globals.fog_color * lit.y + sun * lit.x);
    transmit = transmit * (1.0 - absorb);
  }
  color = color + transmit * globals.background_color;
  textureStore(output, gid.xy, vec4<f32>(color, 1.0));
}
"#;

/// Kernel 1: writes one sparse list into the dense volume.
pub const SCATTER_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> globals: Frame;
@group(0) @binding(1) var<uniform> params: Scatter;
@group(0) @binding(2) var<storage, read> entries: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> volume: array<vec2<f32>>;
@group(0) @binding(4) var<storage, read_write> shadow: array<vec2<f32>>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
  let i = linear_index(gid, groups);
  if (i >= params.entry_count) {
    return;
  }
  let entry = entries[i];
  if (!in_dims(entry.xyz, globals.volume_dims)) {
    return;
  }
  let index = volume_index(vec3<u32>(entry.xyz), globals.volume_dims);
  if (params.copy1 != 0u) {
    volume[index].y = entry.w;
  } else {
    volume[index].x = entry.w;
    shadow[index] = vec2<f32>(1.0, 0.0);
  }
}
"#;

/// Kernel 2: lights every primary entry and folds it into the history.
pub const PREPASS_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> globals: Frame;
@group(0) @binding(1) var<uniform> params: Scatter;
@group(0) @binding(2) var<storage, read> entries: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read> volume: array<vec2<f32>>;
@group(0) @binding(4) var<storage, read_write> shadow: array<vec2<f32>>;
@group(0) @binding(5) var<storage, read_write> history: array<vec4<f32>>;
@group(0) @binding(6) var<storage, read> lights: array<Light>;
@group(0) @binding(7) var<storage, read> sdf_index: array<u32>;
@group(0) @binding(8) var<storage, read> sdf_cells: array<SdfCell>;

const SHADOW_STEPS: u32 = 24u;

fn density_at(p: vec3<f32>) -> f32 {
  if (!in_dims(p, min(params.extent, globals.volume_dims))) {
    return 0.0;
  }
  let v = volume[volume_index(vec3<u32>(p), globals.volume_dims)];
  return v.x + v.y;
}

fn sdf_slot(world: vec3<f32>) -> u32 {
  if (globals.has_sdf == 0u) {
    return 0u;
  }
  let local = world - globals.bounds_min;
  let res = globals.sdf_resolution;
  if (any(local < vec3<f32>(0.0)) || any(local >= vec3<f32>(f32(res)))) {
    return 0u;
  }
  return sdf_index[sdf_cell_index(vec3<u32>(local), res)];
}

fn transmittance(origin: vec3<f32>, dir: vec3<f32>, max_dist: f32) -> f32 {
  let step_len = f32(globals.shadow_distance_offset);
  var optical = 0.0;
  var t = step_len;
  for (var s = 0u; s < SHADOW_STEPS; s = s + 1u) {
    if (t > max_dist) {
      break;
    }
    let p = origin + dir * t;
    if (sdf_slot(p) != 0u) {
      return 0.0;
    }
    optical = optical + density_at(p) * step_len;
    t = t + step_len;
  }
  return exp(-optical * globals.fog_adjustment);
}

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
  let i = linear_index(gid, groups);
  if (i >= params.entry_count) {
    return;
  }
  let entry = entries[i];
  if (!in_dims(entry.xyz, globals.volume_dims)) {
    return;
  }
  let p = entry.xyz + vec3<f32>(0.5);

  var radiance = vec3<f32>(0.0);
  var sun_visibility = 1.0;
  for (var l = 0u; l < globals.light_count; l = l + 1u) {
    let light = lights[l];
    let ray = light_ray(light, p);
    let visibility = transmittance(p, ray.xyz, ray.w);
    if (light.kind == LIGHT_DIRECTIONAL) {
      sun_visibility = visibility;
    }
    radiance = radiance + light.color * visibility * light_falloff(light, ray.w);
  }
  if (globals.indirect_lighting != 0u) {
    radiance = radiance + globals.fog_color * 0.25;
    let below = sdf_slot(p - vec3<f32>(0.0, 2.0 * f32(globals.shadow_distance_offset), 0.0));
    if (below != 0u) {
      radiance = radiance + sdf_cells[below - 1u].radiance * 0.5;
    }
  }

  let h = accumulate(history[i], radiance, globals.reset_history != 0u);
  history[i] = h;
  let luminance = dot(h.xyz, vec3<f32>(0.2126, 0.7152, 0.0722));
  shadow[volume_index(vec3<u32>(entry.xyz), globals.volume_dims)] = vec2<f32>(sun_visibility, luminance);
}
"#;

/// Kernel 3: zeroes the whole volume. Assets of different extents share the
/// buffers, so cells past the active extent must not keep old density.
pub const VOLUME_CLEAR_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> globals: Frame;
@group(0) @binding(1) var<uniform> params: Scatter;
@group(0) @binding(2) var<storage, read_write> volume: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read_write> shadow: array<vec2<f32>>;

@compute @workgroup_size(4, 4, 4)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
  if (any(gid >= globals.volume_dims)) {
    return;
  }
  let index = volume_index(gid, globals.volume_dims);
  volume[index] = vec2<f32>(0.0);
  shadow[index] = vec2<f32>(1.0, 0.0);
}
"#;

/// Kernel 4: marks every SDF cell a mesh's triangles pass through.
pub const VOXELIZE_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> mesh: MeshParams;
@group(0) @binding(1) var<storage, read> vertices: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> indices: array<u32>;
@group(0) @binding(3) var<storage, read_write> occupancy: array<atomic<u32>>;
@group(0) @binding(4) var<storage, read_write> counter: array<atomic<u32>>;

const MAX_SUBDIVISIONS: u32 = 64u;

fn mark(p: vec3<f32>) {
  let res = mesh.sdf_resolution;
  if (any(p < vec3<f32>(0.0)) || any(p >= vec3<f32>(f32(res)))) {
    return;
  }
  let cell = sdf_cell_index(vec3<u32>(p), res);
  let bit = 1u << (cell & 31u);
  let previous = atomicOr(&occupancy[cell >> 5u], bit);
  if ((previous & bit) == 0u) {
    atomicAdd(&counter[0], 1u);
  }
}

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
  let tri = linear_index(gid, groups);
  if (tri >= mesh.triangle_count) {
    return;
  }
  let a = vertices[indices[tri * 3u]].xyz * mesh.scale + mesh.position;
  let b = vertices[indices[tri * 3u + 1u]].xyz * mesh.scale + mesh.position;
  let c = vertices[indices[tri * 3u + 2u]].xyz * mesh.scale + mesh.position;
  let longest = max(length(b - a), max(length(c - b), length(a - c)));
  let n = clamp(u32(ceil(longest * 2.0)), 1u, MAX_SUBDIVISIONS);
  let inv = 1.0 / f32(n);
  for (var i = 0u; i <= n; i = i + 1u) {
    for (var j = 0u; j <= n - i; j = j + 1u) {
      mark(a + (b - a) * (f32(i) * inv) + (c - a) * (f32(j) * inv));
    }
  }
}
"#;

/// Kernel 5: empties the SDF accumulation volume.
pub const SDF_CLEAR_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> params: SdfParams;
@group(0) @binding(1) var<storage, read_write> occupancy: array<atomic<u32>>;
@group(0) @binding(2) var<storage, read_write> sdf_index: array<u32>;

@compute @workgroup_size(4, 4, 4)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
  let res = params.resolution;
  if (any(gid >= vec3<u32>(res))) {
    return;
  }
  let cell = sdf_cell_index(gid, res);
  sdf_index[cell] = 0u;
  if ((cell & 31u) == 0u) {
    atomicStore(&occupancy[cell >> 5u], 0u);
  }
}
"#;

/// Kernel 6: relights every compact SDF cell.
pub const SDF_LIGHT_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> globals: Frame;
@group(0) @binding(1) var<uniform> params: SdfParams;
@group(0) @binding(2) var<storage, read> sites: array<u32>;
@group(0) @binding(3) var<storage, read_write> sdf_cells: array<SdfCell>;
@group(0) @binding(4) var<storage, read> lights: array<Light>;
@group(0) @binding(5) var<storage, read> volume: array<vec2<f32>>;
@group(0) @binding(6) var<storage, read> occupancy: array<u32>;

const SHADOW_STEPS: u32 = 16u;

fn occupied(c: vec3<i32>) -> f32 {
  let res = i32(params.resolution);
  if (any(c < vec3<i32>(0)) || any(c >= vec3<i32>(res))) {
    return 0.0;
  }
  let cell = sdf_cell_index(vec3<u32>(c), params.resolution);
  return f32((occupancy[cell >> 5u] >> (cell & 31u)) & 1u);
}

fn volume_transmittance(origin: vec3<f32>, dir: vec3<f32>, max_dist: f32) -> f32 {
  let step_len = f32(globals.shadow_distance_offset);
  var optical = 0.0;
  var t = step_len;
  for (var s = 0u; s < SHADOW_STEPS; s = s + 1u) {
    if (t > max_dist) {
      break;
    }
    let p = origin + dir * t;
    if (in_dims(p, globals.volume_dims)) {
      let v = volume[volume_index(vec3<u32>(p), globals.volume_dims)];
      optical = optical + (v.x + v.y) * step_len;
    }
    t = t + step_len;
  }
  return exp(-optical * globals.fog_adjustment);
}

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
  let i = linear_index(gid, groups);
  if (i >= params.site_count) {
    return;
  }
  let res = params.resolution;
  let cell = sites[i];
  let c = vec3<u32>(cell % res, (cell / res) % res, cell / (res * res));
  let ci = vec3<i32>(c);
  let gradient = vec3<f32>(
    occupied(ci - vec3<i32>(1, 0, 0)) - occupied(ci + vec3<i32>(1, 0, 0)),
    occupied(ci - vec3<i32>(0, 1, 0)) - occupied(ci + vec3<i32>(0, 1, 0)),
    occupied(ci - vec3<i32>(0, 0, 1)) - occupied(ci + vec3<i32>(0, 0, 1)),
  );
  let normal = select(vec3<f32>(0.0, 1.0, 0.0), normalize(gradient), dot(gradient, gradient) > 0.0);
  let world = vec3<f32>(c) + vec3<f32>(0.5) + globals.bounds_min;

  var radiance = globals.fog_color * 0.1;
  for (var l = 0u; l < globals.light_count; l = l + 1u) {
    let light = lights[l];
    let ray = light_ray(light, world);
    let facing = max(dot(normal, ray.xyz), 0.0);
    if (facing <= 0.0) {
      continue;
    }
    let visibility = volume_transmittance(world, ray.xyz, ray.w);
    radiance = radiance + light.color * facing * visibility * light_falloff(light, ray.w);
  }

  var state = sdf_cells[i];
  let h = accumulate(vec4<f32>(state.radiance, state.samples), radiance, globals.reset_history != 0u);
  state.radiance = h.xyz;
  state.samples = h.w;
  state.normal = normal;
  sdf_cells[i] = state;
}
"#;

/// Kernel 7: compacts occupied cells into sites (build) or clears the
/// accumulation volume (reinit).
pub const SDF_BUILD_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> params: SdfParams;
@group(0) @binding(1) var<storage, read_write> occupancy: array<atomic<u32>>;
@group(0) @binding(2) var<storage, read_write> sdf_index: array<u32>;
@group(0) @binding(3) var<storage, read_write> sites: array<u32>;
@group(0) @binding(4) var<storage, read_write> sdf_cells: array<SdfCell>;
@group(0) @binding(5) var<storage, read_write> counter: array<atomic<u32>>;

@compute @workgroup_size(4, 4, 4)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
  let res = params.resolution;
  if (any(gid >= vec3<u32>(res))) {
    return;
  }
  let cell = sdf_cell_index(gid, res);
  if (params.mode == SDF_MODE_REINIT) {
    sdf_index[cell] = 0u;
    if ((cell & 31u) == 0u) {
      atomicStore(&occupancy[cell >> 5u], 0u);
    }
    return;
  }
  let word = atomicLoad(&occupancy[cell >> 5u]);
  if ((word & (1u << (cell & 31u))) == 0u) {
    sdf_index[cell] = 0u;
    return;
  }
  let slot = atomicAdd(&counter[1], 1u);
  if (slot >= params.site_count) {
    sdf_index[cell] = 0u;
    return;
  }
  sites[slot] = cell;
  sdf_index[cell] = slot + 1u;
  sdf_cells[slot] = SdfCell(vec3<f32>(0.0), 0.0, vec3<f32>(0.0), 0.0);
}
"#;
